//! Number formatting for tab-delimited outputs.

/// Short general-precision decimal with six significant digits, switching
/// to scientific notation for very small or very large magnitudes.
pub fn general(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if x == 0.0 {
        return "0".to_string();
    }
    let exp = x.abs().log10().floor() as i32;
    if !(-5..6).contains(&exp) {
        return scientific(x);
    }
    let decimals = (5 - exp).max(0) as usize;
    trim_zeros(format!("{:.*}", decimals, x))
}

/// Scientific notation with six significant digits, e.g. `1.2345e-08`.
pub fn scientific(x: f64) -> String {
    if !x.is_finite() {
        return general(x);
    }
    let s = format!("{:.5e}", x);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let mantissa = trim_zeros(mantissa.to_string());
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ("-", d),
                None => ("+", exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => s,
    }
}

/// Shortest representation that parses back to the same value. Used for
/// quantities read back by the predictor.
pub fn exact(x: f64) -> String {
    if x.is_finite() {
        format!("{}", x)
    } else {
        general(x)
    }
}

fn trim_zeros(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
