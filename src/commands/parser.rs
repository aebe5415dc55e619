use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, warn};

/// One parsed command definition file.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    /// Macro code after the header lines.
    pub code: String,
    pub path: PathBuf,
}

/// Strip `//` comments, line by line. A `//` inside an unclosed `[...]` is
/// function-argument content and stays.
fn strip_comments(code: &str) -> String {
    code.lines()
        .map(|line| {
            let Some(comment) = line.find("//") else {
                return line.to_string();
            };
            let mut depth = 0i32;
            for c in line[..comment].chars() {
                match c {
                    '[' => depth += 1,
                    ']' => depth -= 1,
                    _ => {}
                }
            }
            if depth > 0 {
                line.to_string()
            } else {
                line[..comment].to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the bracketed value of a header line like `$name[...]`.
fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?.strip_prefix('[')?;
    let end = rest.find(']')?;
    let value = rest[..end].trim();
    (!value.is_empty()).then_some(value)
}

struct Header {
    name: Option<String>,
    aliases: Vec<String>,
    code_start: usize,
}

fn parse_header(code: &str) -> Header {
    let mut name = None;
    let mut aliases = Vec::new();
    let mut code_start = 0;

    for (i, raw) in code.lines().enumerate() {
        let line = raw.trim();

        if let Some(value) = header_value(line, "$name") {
            name = Some(value.to_lowercase());
            code_start = i + 1;
            continue;
        }

        if let Some(value) = header_value(line, "$aliases") {
            aliases = value
                .split(';')
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect();
            code_start = i + 1;
            continue;
        }

        // First non-header content after the name ends the header block.
        if name.is_some() && !line.is_empty() {
            break;
        }
    }

    Header {
        name,
        aliases,
        code_start,
    }
}

/// Parse one command file's contents. Returns `None` (with a log) when the
/// file has no `$name` header.
pub fn parse_command(path: &Path, raw: &str) -> Option<Command> {
    let content = strip_comments(raw);
    let header = parse_header(&content);

    let Some(name) = header.name else {
        warn!(path = %path.display(), "command file has no $name declaration, skipping");
        return None;
    };

    let code = content
        .lines()
        .skip(header.code_start)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Some(Command {
        name,
        aliases: header.aliases,
        code,
        path: path.to_path_buf(),
    })
}

/// Load every `.js` command file in `dir`, keyed by name and alias. Files
/// that fail to read or parse are skipped, not fatal.
pub async fn load_dir(dir: &Path) -> io::Result<HashMap<String, Arc<Command>>> {
    let mut commands = HashMap::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("js") {
            continue;
        }

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(path = %path.display(), "failed to read command file: {e}");
                continue;
            }
        };

        let Some(command) = parse_command(&path, &raw) else {
            continue;
        };
        let command = Arc::new(command);

        debug!(
            name = %command.name,
            aliases = command.aliases.len(),
            "loaded command"
        );
        for alias in &command.aliases {
            commands.insert(alias.clone(), Arc::clone(&command));
        }
        commands.insert(command.name.clone(), command);
    }

    Ok(commands)
}
