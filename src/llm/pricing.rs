/// USD per million tokens, (input, output)
type Price = (f64, f64);

/// Models this core knows how to bill. Membership doubles as the "known
/// model id" check for evaluation definitions and stage configs.
const PRICE_TABLE: &[(&str, Price)] = &[
    ("claude-sonnet-4-20250514", (3.0, 15.0)),
    ("claude-opus-4-20250514", (15.0, 75.0)),
    ("claude-3-5-haiku-20241022", (0.8, 4.0)),
    ("claude-3-haiku-20240307", (0.25, 1.25)),
];

/// Whether a model id can be priced and invoked by this core
pub fn is_known_model(model: &str) -> bool {
    PRICE_TABLE.iter().any(|(id, _)| *id == model)
}

/// Billed USD cost for a call's token counts. Unknown models cost 0.0;
/// definition validation rejects them before any call is made.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let Some((_, (input_price, output_price))) =
        PRICE_TABLE.iter().find(|(id, _)| *id == model)
    else {
        return 0.0;
    };
    (input_tokens as f64 * input_price + output_tokens as f64 * output_price) / 1_000_000.0
}
