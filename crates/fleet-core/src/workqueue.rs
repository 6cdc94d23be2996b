use std::path::Path;

use tracing::debug;

use crate::error::CoreError;

/// Read the newline-delimited work queue: one command (artifact locator) per line.
///
/// Trailing whitespace is trimmed. A blank line in the middle of the file, or a file with no
/// commands at all, is malformed.
pub async fn load_work_queue(path: impl AsRef<Path>) -> Result<Vec<String>, CoreError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::Allocation(format!("read {}: {e}", path.display())))?;

    let commands = parse_work_queue(&content)
        .map_err(|e| CoreError::Allocation(format!("{}: {e}", path.display())))?;
    debug!(target: "fleet.core.workqueue", path = %path.display(), count = commands.len(), "work queue loaded");
    Ok(commands)
}

pub fn parse_work_queue(content: &str) -> Result<Vec<String>, String> {
    let mut lines: Vec<&str> = content.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return Err("work queue is empty".to_string());
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let line = line.trim_start();
            if line.is_empty() {
                Err(format!("line {}: empty command", i + 1))
            } else {
                Ok(line.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn one_task_per_line() {
        let cmds = parse_work_queue("echo a\necho b\n").unwrap();
        assert_eq!(cmds, vec!["echo a", "echo b"]);
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let cmds = parse_work_queue("a.sh\r\nb.sh  \n\n\n").unwrap();
        assert_eq!(cmds, vec!["a.sh", "b.sh"]);
    }

    #[test]
    fn blank_line_inside_is_malformed() {
        let err = parse_work_queue("a.sh\n\nb.sh\n").unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn empty_source_is_rejected() {
        assert!(parse_work_queue("").is_err());
        assert!(parse_work_queue("\n  \n").is_err());
    }

    #[tokio::test]
    async fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scripts/one.sh").unwrap();
        writeln!(file, "scripts/two.sh").unwrap();

        let cmds = load_work_queue(file.path()).await.unwrap();
        assert_eq!(cmds.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_allocation_error() {
        let err = load_work_queue("/definitely/not/here/commands").await.unwrap_err();
        assert!(matches!(err, CoreError::Allocation(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
