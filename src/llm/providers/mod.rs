pub mod ollama;
pub mod remote;

use tracing::{debug, info};

/// Pulls the SQL statement out of a model completion. Tries fenced code
/// blocks first, then plain fences, then scans for a line starting with a
/// SQL keyword. Returns the content unchanged when nothing matches.
pub(crate) fn extract_sql(content: &str) -> String {
    if let Some(start) = content.find("```sql") {
        if let Some(end) = content.rfind("```") {
            if end > start + 6 {
                let sql = content[start + 6..end].trim();
                debug!("Extracted SQL from fenced code block: {}", sql);
                return sql.to_string();
            }
        }
    }

    if let Some(start) = content.find("```") {
        let content_after_first = &content[start + 3..];
        if let Some(end) = content_after_first.find("```") {
            let sql = content_after_first[..end].trim();
            debug!("Extracted SQL from plain code block: {}", sql);
            return sql.to_string();
        }
    }

    let sql_keywords = ["SELECT", "WITH"];
    let lines: Vec<&str> = content.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim().to_uppercase();
        if sql_keywords.iter().any(|kw| trimmed.starts_with(kw)) {
            let mut sql = line.trim().to_string();

            for next_line in lines.iter().skip(i + 1).map(|l| l.trim()) {
                if next_line.starts_with("```") {
                    break;
                }

                sql.push(' ');
                sql.push_str(next_line);

                if next_line.ends_with(';') {
                    break;
                }
            }

            debug!("Extracted SQL by line scanning: {}", sql);
            return sql;
        }
    }

    info!("No SQL markers found in completion, returning content as-is");
    content.trim().to_string()
}
