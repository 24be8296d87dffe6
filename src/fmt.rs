/// Format whole yen with thousands separators: ¥1,234
pub fn yen(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();

    let mut with_commas = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if amount < 0 {
        format!("-¥{with_commas}")
    } else {
        format!("¥{with_commas}")
    }
}

/// `yen` for optional amounts, blank when absent.
pub fn yen_opt(amount: Option<i64>) -> String {
    amount.map(yen).unwrap_or_default()
}
