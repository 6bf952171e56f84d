/// Format a currency-converted value for display, e.g. `$1.23`.
pub fn format_fiat(value: f64) -> String {
    format!("${:.2}", value)
}
