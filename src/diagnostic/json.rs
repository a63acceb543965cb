use crate::span::SourceMap;

use super::Diagnostic;

/// One diagnostic as a single-line JSON object.
pub fn render(d: &Diagnostic) -> String {
    let source_map = d.source.as_deref().map(SourceMap::new);

    let labels: Vec<serde_json::Value> = d
        .labels
        .iter()
        .map(|l| {
            let mut obj = serde_json::json!({
                "start": l.span.start,
                "end": l.span.end,
                "message": l.message,
                "primary": l.is_primary,
            });
            if let Some(map) = &source_map {
                let (line, col) = map.lookup(l.span.start);
                obj["line"] = serde_json::Value::from(line);
                obj["col"] = serde_json::Value::from(col);
            }
            obj
        })
        .collect();

    let mut obj = serde_json::json!({
        "severity": "error",
        "message": d.message,
        "labels": labels,
        "notes": d.notes,
    });
    if let Some(code) = d.code {
        obj["code"] = serde_json::Value::String(code.to_string());
    }
    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::String(s.clone());
    }

    obj.to_string()
}
