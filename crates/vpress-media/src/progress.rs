//! Incremental progress parsing from the transcoder's diagnostic stream.
//!
//! FFmpeg prints the input `Duration:` header once and then emits elapsed
//! markers: `-progress` key=value pairs (`out_time_us=`, `out_time=`) and the
//! classic `time=` status lines. The parser latches the duration from the
//! first marker observed and converts every newer elapsed marker into a
//! completion percentage.

/// Stateful percent-complete scanner.
///
/// Emitted values are strictly increasing and capped at 99; the value 100 is
/// reserved for the explicit success transition after the tool has exited.
/// Without a duration marker the parser emits nothing (indeterminate
/// progress).
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration_secs: Option<f64>,
    last_emitted: u8,
}

impl ProgressParser {
    /// Create a parser with no duration latched yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total duration learned from the stream, if any.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Feed one line of diagnostic output.
    ///
    /// Returns a new percentage when the line advances progress.
    pub fn feed_line(&mut self, line: &str) -> Option<u8> {
        let line = line.trim();

        if self.duration_secs.is_none() {
            if let Some(rest) = line.strip_prefix("Duration:") {
                let stamp = rest.split(',').next().unwrap_or(rest);
                if let Some(secs) = parse_timestamp(stamp) {
                    if secs > 0.0 {
                        self.duration_secs = Some(secs);
                    }
                }
                return None;
            }
        }

        let elapsed = parse_elapsed(line)?;
        let duration = self.duration_secs?;

        let pct = (elapsed / duration * 100.0).round().clamp(0.0, 99.0) as u8;
        if pct > self.last_emitted {
            self.last_emitted = pct;
            Some(pct)
        } else {
            None
        }
    }
}

/// Extract elapsed seconds from one diagnostic line, if it carries a marker.
fn parse_elapsed(line: &str) -> Option<f64> {
    // -progress output: one key=value pair per line.
    // Both out_time_us and out_time_ms carry microseconds.
    if let Some((key, value)) = line.split_once('=') {
        match key {
            "out_time_us" | "out_time_ms" => {
                return value.parse::<i64>().ok().map(|us| us as f64 / 1_000_000.0);
            }
            "out_time" => return parse_timestamp(value),
            _ => {}
        }
    }

    // Classic status line: "frame= ... time=00:00:12.34 bitrate=..."
    if let Some(idx) = line.find("time=") {
        let rest = &line[idx + 5..];
        let token = rest.split_whitespace().next().unwrap_or(rest);
        return parse_timestamp(token);
    }

    None
}

/// Parse "HH:MM:SS.cc" into seconds.
fn parse_timestamp(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" {
        return None;
    }

    let mut parts = s.split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = parts.next()?.trim().parse().ok()?;
    let seconds: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_latched_once() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.feed_line("Duration: 00:01:40.00, start: 0.000000"), None);
        assert_eq!(parser.duration_secs(), Some(100.0));

        // A second duration marker (e.g. from a second input) is ignored
        parser.feed_line("Duration: 00:00:10.00, start: 0.000000");
        assert_eq!(parser.duration_secs(), Some(100.0));
    }

    #[test]
    fn test_no_duration_no_emissions() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.feed_line("out_time_us=5000000"), None);
        assert_eq!(parser.feed_line("time=00:00:05.00 bitrate=1k"), None);
    }

    #[test]
    fn test_percentages_from_progress_pairs() {
        let mut parser = ProgressParser::new();
        parser.feed_line("Duration: 00:01:40.00, start: 0.000000");

        assert_eq!(parser.feed_line("out_time_us=25000000"), Some(25));
        assert_eq!(parser.feed_line("out_time_ms=50000000"), Some(50));
        assert_eq!(parser.feed_line("out_time=00:01:15.00"), Some(75));
    }

    #[test]
    fn test_emissions_strictly_increase() {
        let mut parser = ProgressParser::new();
        parser.feed_line("Duration: 00:01:40.00, start: 0.000000");

        assert_eq!(parser.feed_line("out_time_us=50000000"), Some(50));
        // same value: no emission
        assert_eq!(parser.feed_line("out_time_us=50000000"), None);
        // older value: no emission
        assert_eq!(parser.feed_line("out_time_us=25000000"), None);
        assert_eq!(parser.feed_line("out_time_us=51000000"), Some(51));
    }

    #[test]
    fn test_never_emits_100() {
        let mut parser = ProgressParser::new();
        parser.feed_line("Duration: 00:00:10.00, start: 0.000000");

        assert_eq!(parser.feed_line("out_time_us=9999999"), Some(99));
        assert_eq!(parser.feed_line("out_time_us=10000000"), None);
        assert_eq!(parser.feed_line("out_time_us=99000000"), None);
    }

    #[test]
    fn test_classic_time_status_line() {
        let mut parser = ProgressParser::new();
        parser.feed_line("  Duration: 00:00:50.00, start: 0.000000, bitrate: 128 kb/s");

        let pct = parser.feed_line("frame=  100 fps=25 q=28.0 size=256kB time=00:00:25.00 bitrate=83.9kbits/s speed=1x");
        assert_eq!(pct, Some(50));
    }

    #[test]
    fn test_not_applicable_markers_ignored() {
        let mut parser = ProgressParser::new();
        parser.feed_line("Duration: 00:00:50.00");
        assert_eq!(parser.feed_line("out_time=N/A"), None);
        assert_eq!(parser.feed_line("time=N/A bitrate=N/A"), None);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:00:05.00"), Some(5.0));
        assert_eq!(parse_timestamp("01:02:03.50"), Some(3723.5));
        assert_eq!(parse_timestamp("garbage"), None);
        assert_eq!(parse_timestamp("1:2"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
