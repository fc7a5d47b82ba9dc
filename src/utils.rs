use chrono::{DateTime, Duration, TimeZone, Utc};

/// Display an ASN dotted (`65000.100`) when it exceeds the 2-byte range
pub fn asn_to_dotted(asn: u32) -> String {
    if asn <= u32::from(u16::MAX) {
        format!("{}", asn)
    } else {
        format!("{}.{}", asn >> 16, asn & 0xffff)
    }
}

fn fit_with_remainder(dividend: u64, divisor: u64) -> (u64, u64) {
    (dividend / divisor, dividend % divisor)
}

/// Given a duration, format like "00:00:00"
pub fn format_elapsed_time(elapsed: Duration) -> String {
    let elapsed = elapsed.num_seconds().abs() as u64;
    let (hours, remainder) = fit_with_remainder(elapsed, 3600);
    let (minutes, seconds) = fit_with_remainder(remainder, 60);
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Given a timestamp, get the elapsed time and return formatted string
pub fn format_time_as_elapsed<Tz>(time: DateTime<Tz>) -> String
where
    Tz: TimeZone,
{
    format_elapsed_time(Utc::now().signed_duration_since(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asn_to_dotted() {
        assert_eq!(asn_to_dotted(100), "100".to_string());
        assert_eq!(asn_to_dotted(65000), "65000".to_string());
        assert_eq!(asn_to_dotted(4259840100), "65000.100".to_string());
    }

    #[test]
    fn test_format_elapsed_time() {
        assert_eq!(format_elapsed_time(Duration::seconds(30)), "00:00:30");
        assert_eq!(format_elapsed_time(Duration::seconds(3690)), "01:01:30");
    }
}
