use crate::variables::ComparisonRule;

pub fn values_in_sync<S: AsRef<str>>(rule: ComparisonRule, values: &[S], tolerance: f64) -> bool {
    if values.len() <= 1 {
        return true;
    }
    match rule {
        ComparisonRule::NumericTolerance => match parse_all(values) {
            Some((min, max)) => max - min <= tolerance,
            None => all_equal(values),
        },
        ComparisonRule::NumericExact => match parse_all(values) {
            Some((min, max)) => max == min,
            None => all_equal(values),
        },
        ComparisonRule::StringEquality => all_equal(values),
    }
}

/// Blank or whitespace-only values read as 0.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_all<S: AsRef<str>>(values: &[S]) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values {
        let number = parse_number(value.as_ref())?;
        min = min.min(number);
        max = max.max(number);
    }
    Some((min, max))
}

fn all_equal<S: AsRef<str>>(values: &[S]) -> bool {
    let Some(first) = values.first() else {
        return true;
    };
    values.iter().all(|value| value.as_ref() == first.as_ref())
}
