use rulecalc::{evaluate_expression, KeyedValues};

fn main() {
    pretty_env_logger::init();

    let values = KeyedValues::from([
        ("price".to_string(), 120.0),
        ("volume".to_string(), 3000.0),
    ]);

    let expression = "price > 100 & volume < 5000";

    match evaluate_expression(expression, &values) {
        Ok(result) => println!("Result: {}", result),
        Err(err) => println!("Error: {}", err),
    }
}
