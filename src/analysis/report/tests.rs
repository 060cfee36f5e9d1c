use super::*;

const MARKDOWN_ANSWER: &str = "\
Here is the analysis.

1. **Vulnerability name (or NONE)**: SQL Injection
2. **Source → Sink data flow**: `req.query.term` → `db.query` template literal
3. **Why it is vulnerable**: user input is interpolated into the SQL string.
   An attacker can close the quote and append clauses.
4. **How to fix**:
   1. Use parameterized queries
   2. Validate `term`
";

#[test]
fn parses_markdown_answer() {
    let report = AnalysisReport::parse(MARKDOWN_ANSWER);
    assert_eq!(report.answer, MARKDOWN_ANSWER);
    assert!(report.has_finding());

    let findings = report.findings.expect("should find items");
    assert_eq!(findings.vulnerability.as_deref(), Some("SQL Injection"));
    assert_eq!(
        findings.data_flow.as_deref(),
        Some("`req.query.term` → `db.query` template literal")
    );
    assert_eq!(
        findings.explanation.as_deref(),
        Some(
            "user input is interpolated into the SQL string.\n   An attacker can close the quote and append clauses."
        )
    );
    assert_eq!(
        findings.fix.as_deref(),
        Some("1. Use parameterized queries\n   2. Validate `term`")
    );
}

#[test]
fn parses_plain_answer() {
    let answer = "1) XSS\n2) req.query.url -> res.send\n3) Output is not escaped\n4) Escape HTML";
    let findings = AnalysisReport::parse(answer)
        .findings
        .expect("should find items");

    assert_eq!(findings.vulnerability.as_deref(), Some("XSS"));
    assert_eq!(findings.data_flow.as_deref(), Some("req.query.url -> res.send"));
    assert_eq!(findings.explanation.as_deref(), Some("Output is not escaped"));
    assert_eq!(findings.fix.as_deref(), Some("Escape HTML"));
}

#[test]
fn label_on_its_own_line() {
    let answer = "**1. Vulnerability name**\nOpen Redirect\n\n**2. Source → Sink**\nreq.query.url";
    let findings = AnalysisReport::parse(answer)
        .findings
        .expect("should find items");

    assert_eq!(findings.vulnerability.as_deref(), Some("Open Redirect"));
    assert_eq!(findings.data_flow.as_deref(), Some("req.query.url"));
    assert_eq!(findings.explanation, None);
}

#[test]
fn none_means_no_finding() {
    let answer = "1. Vulnerability name: NONE\n2. N/A\n3. Input is constant\n4. Nothing to fix";
    let report = AnalysisReport::parse(answer);

    assert!(!report.has_finding());
    let findings = report.findings.expect("should find items");
    assert_eq!(findings.vulnerability, None);
    assert_eq!(findings.explanation.as_deref(), Some("Input is constant"));

    let report = AnalysisReport::parse("1. **NONE**");
    assert!(!report.has_finding());
    assert!(report.findings.is_some());
}

#[test]
fn unstructured_answer() {
    let report = AnalysisReport::parse("The code looks fine to me.");
    assert_eq!(report.findings, None);
    assert!(!report.has_finding());
    assert_eq!(report.answer, "The code looks fine to me.");
}
