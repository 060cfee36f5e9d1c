// Best-effort structure over the reasoner's numbered answer

#[cfg(test)]
mod tests;

use fancy_regex::Regex;
use std::sync::LazyLock;

static ITEM_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:#+\s*)?(?:\*\*)?([1-4])[.)](?:\*\*)?\s*(.*)$")
        .expect("item pattern is valid")
});

static ITEM_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\*\*)?\s*(?:vulnerability(?:\s+name)?|source\s*(?:→|->)\s*sink(?:\s+data\s+flow)?|data\s+flow|why(?:\s+it\s+is\s+vulnerable)?|how\s+to\s+fix|fix)(?:\s*\(or\s+none\))?(?:\s*(?:\*\*\s*:?|:)\s*(?:\*\*)?\s*|\s*$)",
    )
    .expect("label pattern is valid")
});

static NO_FINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[*_`\s]*none\b").expect("none pattern is valid")
});

/// The four answer items requested from the reasoner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    /// `None` when the reasoner answered NONE
    pub vulnerability: Option<String>,
    pub data_flow: Option<String>,
    pub explanation: Option<String>,
    pub fix: Option<String>,
}

/// Raw reasoner answer plus whatever structure could be read from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub answer: String,
    /// Absent when the answer has no numbered items
    pub findings: Option<Findings>,
}

impl AnalysisReport {
    #[inline]
    pub fn parse(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            findings: parse_findings(answer),
        }
    }

    /// Whether the reasoner named a vulnerability
    #[inline]
    pub fn has_finding(&self) -> bool {
        self.findings
            .as_ref()
            .is_some_and(|findings| findings.vulnerability.is_some())
    }
}

fn parse_findings(answer: &str) -> Option<Findings> {
    let mut items: [Option<String>; 4] = Default::default();
    let mut current: Option<usize> = None;

    for line in answer.lines() {
        let start = ITEM_START.captures(line).ok().flatten().and_then(|caps| {
            let number = caps.get(1)?.as_str().parse::<usize>().ok()?;
            let rest = caps.get(2).map_or("", |m| m.as_str());
            Some((number - 1, rest.to_string()))
        });

        match start {
            // Items keep their first occurrence; later repeats belong to the body
            Some((slot, rest)) if items[slot].is_none() => {
                items[slot] = Some(strip_label(&rest));
                current = Some(slot);
            }
            _ => {
                let Some(text) = current.and_then(|slot| items[slot].as_mut()) else {
                    continue;
                };
                if text.is_empty() && line.trim().is_empty() {
                    continue;
                }
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(line.trim_end());
            }
        }
    }

    if items.iter().all(Option::is_none) {
        return None;
    }

    let [vulnerability, data_flow, explanation, fix] = items.map(|item| {
        item.map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    });

    let vulnerability =
        vulnerability.filter(|name| !NO_FINDING.is_match(name).unwrap_or(false));

    Some(Findings {
        vulnerability,
        data_flow,
        explanation,
        fix,
    })
}

fn strip_label(text: &str) -> String {
    match ITEM_LABEL.find(text).ok().flatten() {
        Some(label) => text[label.end()..].to_string(),
        None => text.to_string(),
    }
}
