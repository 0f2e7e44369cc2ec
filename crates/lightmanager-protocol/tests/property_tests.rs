//! Property tests for the FS20 notation and level parsing.

use chrono::{Datelike, NaiveDate, Timelike};
use lightmanager_protocol::{
    encode_set_clock, format_fs20_code, from_bcd, parse_fs20_code, parse_level, Fs20Action,
    InterTechnoAction, ProtocolError,
};
use proptest::prelude::*;

fn fs20_digits(max_pairs: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec((1u8..=4, 1u8..=4), 1..=max_pairs).prop_map(|pairs| {
        pairs
            .iter()
            .flat_map(|(a, b)| [(b'0' + a) as char, (b'0' + b) as char])
            .collect::<String>()
    })
}

// ── FS20 notation ─────────────────────────────────────────────

proptest! {
    #[test]
    fn fs20_format_then_parse_is_identity(value in any::<u16>()) {
        let text = format_fs20_code(value, None);
        prop_assert_eq!(text.len(), 8);
        prop_assert_eq!(parse_fs20_code(&text), Ok(value));
    }

    #[test]
    fn fs20_full_codes_reformat_identically(code in fs20_digits(4)) {
        let value = parse_fs20_code(&code).unwrap();
        if code.len() == 8 {
            prop_assert_eq!(format_fs20_code(value, None), code);
        } else {
            // shorter codes are right aligned and padded with the zero pair "11"
            let padded = format_fs20_code(value, None);
            prop_assert!(padded.ends_with(&code));
            prop_assert!(padded[..8 - code.len()].bytes().all(|b| b == b'1'));
        }
    }

    #[test]
    fn fs20_rejects_digits_outside_1_to_4(code in "[0-9]{2,8}") {
        let valid = code.len() % 2 == 0 && code.bytes().all(|b| (b'1'..=b'4').contains(&b));
        prop_assert_eq!(parse_fs20_code(&code).is_ok(), valid);
    }
}

// ── Dim levels ────────────────────────────────────────────────

proptest! {
    #[test]
    fn percent_levels_stay_within_one_step(percent in 0u32..=100) {
        for max in [16u8, 248u8] {
            let level = parse_level(&format!("{percent}%"), max, "").unwrap() as f64;
            let exact = max as f64 * percent as f64 / 100.0;
            prop_assert!((level - exact).abs() <= 1.0, "{percent}% of {max} gave {level}");
            prop_assert!(level <= max as f64);
        }
    }

    #[test]
    fn absolute_levels_accept_exactly_the_valid_range(level in 0u32..=400) {
        let fs20 = Fs20Action::parse(&level.to_string());
        prop_assert_eq!(fs20.is_ok(), level <= 16);
        let it = InterTechnoAction::parse(&level.to_string());
        prop_assert_eq!(it.is_ok(), level <= 248);
        if let Err(err) = it {
            prop_assert!(matches!(err, ProtocolError::OutOfRange { .. }), "expected OutOfRange error");
        }
    }
}

// ── Clock ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn set_clock_payload_decodes_to_the_same_time(
        days in 0i64..36_500,
        seconds in 0u32..86_400,
    ) {
        let base = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let date = base + chrono::Duration::days(days);
        let time = date.and_hms_opt(seconds / 3600, (seconds / 60) % 60, seconds % 60).unwrap();
        let frames = encode_set_clock(&time).unwrap();
        let b = frames[0].as_bytes();

        prop_assert_eq!(from_bcd(b[1]) as u32, time.second());
        prop_assert_eq!(from_bcd(b[2]) as u32, time.minute());
        prop_assert_eq!(from_bcd(b[3]) as u32, time.hour());
        prop_assert_eq!(from_bcd(b[4]) as u32, time.day());
        prop_assert_eq!(from_bcd(b[5]) as u32, time.month());
        prop_assert_eq!(from_bcd(b[6]) as u32, time.weekday().number_from_monday());
        prop_assert_eq!(2000 + from_bcd(b[7]) as i32, time.year());
    }
}
