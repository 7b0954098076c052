//! JSON Output

use crate::report::SweepReport;

/// Current `schema_version` written into [`ReportMeta`](crate::ReportMeta)
pub const SCHEMA_VERSION: u32 = 1;

/// Serialize a sweep report as pretty-printed JSON.
pub fn generate_json_report(report: &SweepReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Parse a report written by [`generate_json_report`].
pub fn parse_json_report(json: &str) -> Result<SweepReport, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::dummy_report;

    #[test]
    fn test_json_shape() {
        let json = generate_json_report(&dummy_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["integral"]["function"], "cos");
        assert_eq!(value["runs"][0]["executor"], "thread");
        assert_eq!(value["runs"][0]["outcome"]["status"], "completed");
        assert_eq!(value["runs"][4]["outcome"]["status"], "failed");

        let parsed = parse_json_report(&json).unwrap();
        assert_eq!(parsed.runs.len(), 5);
        assert_eq!(parsed.failures(), 1);
    }
}
