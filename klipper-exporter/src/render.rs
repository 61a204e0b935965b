//! Prometheus text exposition format.

use std::collections::HashMap;
use std::fmt::Write;

use klipper_common::Sample;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in Prometheus exposition format.
///
/// Samples are grouped by metric name in order of first appearance; each
/// group gets one `# HELP` and one `# TYPE` line taken from its first sample.
pub fn render_samples(samples: &[Sample]) -> String {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&Sample>> = Vec::new();
    for sample in samples {
        match index.get(sample.name.as_str()) {
            Some(&i) => groups[i].push(sample),
            None => {
                index.insert(&sample.name, groups.len());
                groups.push(vec![sample]);
            }
        }
    }

    let mut output = String::with_capacity(samples.len() * 100);
    for series in &groups {
        let first = series[0];
        writeln!(output, "# HELP {} {}", first.name, escape_help(&first.help)).ok();
        writeln!(output, "# TYPE {} {}", first.name, first.kind.as_str()).ok();
        for sample in series {
            writeln!(
                output,
                "{}{} {}",
                sample.name,
                format_labels(&sample.labels),
                format_value(sample.value)
            )
            .ok();
        }
    }
    output
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
pub(crate) fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
