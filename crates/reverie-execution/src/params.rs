//! `key = value` behavior parameter documents.
//!
//! Numeric assignments are editable; every other line (comments, prose,
//! non-numeric settings) is carried through untouched.

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Param { key: String, value: f64 },
    Text(String),
}

/// Parsed behavior payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDocument {
    lines: Vec<Line>,
}

impl ParameterDocument {
    pub fn parse(payload: &str) -> Self {
        let lines = payload.lines().map(parse_line).collect();
        Self { lines }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.lines.iter().find_map(|line| match line {
            Line::Param { key: k, value } if k == key => Some(*value),
            _ => None,
        })
    }

    /// Updates `key`, appending it if absent.
    pub fn set(&mut self, key: &str, new_value: f64) {
        for line in &mut self.lines {
            if let Line::Param { key: k, value } = line {
                if k == key {
                    *value = new_value;
                    return;
                }
            }
        }
        self.lines.push(Line::Param {
            key: key.to_string(),
            value: new_value,
        });
    }

    /// Numeric parameter names in document order.
    pub fn keys(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Param { key, .. } => Some(key.clone()),
                Line::Text(_) => None,
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Param { key, value } => {
                    out.push_str(key);
                    out.push_str(" = ");
                    out.push_str(&format_number(*value));
                }
                Line::Text(text) => out.push_str(text),
            }
            out.push('\n');
        }
        out
    }
}

fn parse_line(raw: &str) -> Line {
    let trimmed = raw.trim();
    if trimmed.starts_with('#') {
        return Line::Text(raw.to_string());
    }
    let Some((key, value)) = trimmed.split_once('=') else {
        return Line::Text(raw.to_string());
    };
    let key = key.trim();
    let is_identifier = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    match value.trim().parse::<f64>() {
        Ok(value) if is_identifier && value.is_finite() => Line::Param {
            key: key.to_string(),
            value,
        },
        _ => Line::Text(raw.to_string()),
    }
}

/// Four decimals, trailing zeros dropped.
fn format_number(value: f64) -> String {
    let formatted = format!("{:.4}", value);
    let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
    if formatted.is_empty() || formatted == "-0" {
        "0".to_string()
    } else {
        formatted.to_string()
    }
}
