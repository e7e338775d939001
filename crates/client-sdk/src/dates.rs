use chrono::NaiveDate;

pub const DATE_NOT_FOUND: &str = "not found";

/// Capture date encoded in a drone image name as `_YYYYMMDD`, rendered `DD/MM/YYYY`.
///
/// The first underscore followed by eight digits wins. Impossible calendar
/// dates and years below 1000 yield [`DATE_NOT_FOUND`].
pub fn extract_formatted_date(image_name: &str) -> String {
    capture_digits(image_name)
        .and_then(format_date)
        .unwrap_or_else(|| DATE_NOT_FOUND.to_string())
}

fn capture_digits(name: &str) -> Option<&str> {
    let bytes = name.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'_')
        .find_map(|(i, _)| {
            let digits = bytes.get(i + 1..i + 9)?;
            digits
                .iter()
                .all(u8::is_ascii_digit)
                .then(|| &name[i + 1..i + 9])
        })
}

fn format_date(raw: &str) -> Option<String> {
    let (year, month, day) = (&raw[0..4], &raw[4..6], &raw[6..8]);
    let y: i32 = year.parse().ok()?;
    if y < 1000 {
        return None;
    }
    NaiveDate::from_ymd_opt(y, month.parse().ok()?, day.parse().ok()?)?;
    Some(format!("{day}/{month}/{year}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_date_block() {
        assert_eq!(extract_formatted_date("whale_20230401_001.jpg"), "01/04/2023");
        assert_eq!(extract_formatted_date("a_20230601.jpg"), "01/06/2023");
        assert_eq!(extract_formatted_date("run_1_20221231.png"), "31/12/2022");
    }

    #[test]
    fn invalid_calendar_dates_are_not_found() {
        assert_eq!(extract_formatted_date("whale_20231301.jpg"), DATE_NOT_FOUND);
        assert_eq!(extract_formatted_date("whale_20230230.jpg"), DATE_NOT_FOUND);
        assert_eq!(extract_formatted_date("whale_20230229.jpg"), DATE_NOT_FOUND);
        assert_eq!(extract_formatted_date("whale_20240229.jpg"), "29/02/2024");
        assert_eq!(extract_formatted_date("whale_09990101.jpg"), DATE_NOT_FOUND);
    }

    #[test]
    fn missing_or_short_blocks_are_not_found() {
        assert_eq!(extract_formatted_date("20230401.jpg"), DATE_NOT_FOUND);
        assert_eq!(extract_formatted_date("whale_2023041.jpg"), DATE_NOT_FOUND);
        assert_eq!(extract_formatted_date(""), DATE_NOT_FOUND);
        assert_eq!(extract_formatted_date("dugong_"), DATE_NOT_FOUND);
    }
}
