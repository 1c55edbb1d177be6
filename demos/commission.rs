use rulecalc::{Accessors, Evaluator};

struct Sale {
    amount: f64,
    item_count: f64,
}

fn main() {
    pretty_env_logger::init();

    let mut evaluator = Evaluator::new();
    evaluator
        .functions_mut()
        .add_math()
        .unwrap()
        .add_logical()
        .unwrap();

    let accessors = Accessors::new()
        .field("Amount", |s: &Sale| s.amount)
        .field("ItemCount", |s: &Sale| s.item_count)
        .alias("Amount", "Total")
        .method("PerItem", 0, |s: &Sale, _| s.amount / s.item_count);

    let formula = "total * if(BetweenInclusive(total, 0, 1000), 0.01, \
                   if(BetweenInclusive(total, 1001, 10000), 0.02, 0.03)) \
                   + if(PerItem() > 100, 5, 0)";

    let sales = [
        Sale {
            amount: 500.0,
            item_count: 2.0,
        },
        Sale {
            amount: 5000.0,
            item_count: 10.0,
        },
        Sale {
            amount: 20000.0,
            item_count: 4.0,
        },
    ];

    for (i, sale) in sales.iter().enumerate() {
        match evaluator.evaluate_with(formula, sale, &accessors) {
            Ok(commission) => println!("Sale {}: commission {}", i, commission),
            Err(err) => println!("Sale {}: error {}", i, err),
        }
    }
}
