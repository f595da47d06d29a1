//! External thumbnailer descriptors.
//!
//! Descriptors are `.thumbnailer` key-value files with a
//! `[Thumbnailer Entry]` group: `Exec` (command template), `MimeType`
//! (semicolon-separated list) and optional `TryExec` (probe executable).

use crate::uri::uri_to_local_path;
use log::warn;
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub(crate) const THUMBNAILER_EXTENSION: &str = "thumbnailer";
const ENTRY_GROUP: &str = "[Thumbnailer Entry]";

/// One external thumbnailer program, loaded from a descriptor file.
#[derive(Clone, Debug)]
pub struct Thumbnailer {
    /// Path of the descriptor file this was loaded from.
    pub path: PathBuf,
    /// Command template with `%u`/`%i`/`%o`/`%s`/`%%` placeholders.
    pub exec: String,
    /// Optional executable probed on `$PATH` before use.
    pub try_exec: Option<String>,
    /// MIME types this thumbnailer claims to handle.
    pub mime_types: Vec<String>,
}

impl Thumbnailer {
    /// Load a descriptor file. Malformed descriptors are discarded with a
    /// diagnostic and the caller continues with the remaining ones.
    pub fn load(path: &Path) -> Option<Thumbnailer> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("failed to load thumbnailer from {}: {e}", path.display());
                return None;
            }
        };

        let mut in_entry_group = false;
        let mut seen_group = false;
        let mut exec = None;
        let mut try_exec = None;
        let mut mime_types: Option<Vec<String>> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') {
                in_entry_group = line == ENTRY_GROUP;
                seen_group |= in_entry_group;
                continue;
            }
            if !in_entry_group {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "Exec" => exec = Some(value.trim().to_string()),
                    "TryExec" => try_exec = Some(value.trim().to_string()),
                    "MimeType" => {
                        mime_types = Some(
                            value
                                .split(';')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(String::from)
                                .collect(),
                        )
                    }
                    _ => {}
                }
            }
        }

        if !seen_group {
            warn!("invalid thumbnailer {}: missing {ENTRY_GROUP}", path.display());
            return None;
        }
        let Some(exec) = exec else {
            warn!("invalid thumbnailer {}: missing Exec key", path.display());
            return None;
        };
        let Some(mime_types) = mime_types.filter(|m| !m.is_empty()) else {
            warn!("invalid thumbnailer {}: missing MimeType key", path.display());
            return None;
        };

        Some(Thumbnailer {
            path: path.to_path_buf(),
            exec,
            try_exec,
            mime_types,
        })
    }

    /// Whether the thumbnailer can be run. `TryExec` is optional; when
    /// absent the `Exec` command is assumed runnable.
    pub fn is_usable(&self) -> bool {
        match &self.try_exec {
            Some(program) => find_program_in_path(program).is_some(),
            None => true,
        }
    }

    /// Expand this thumbnailer's command template. See
    /// [`expand_command_template`].
    pub fn expand_command(&self, size: u32, uri: &str, outfile: &Path) -> Option<String> {
        expand_command_template(&self.exec, size, uri, outfile)
    }
}

/// Expand a command template into a concrete command line.
///
/// `%u` is the quoted source URI, `%i` the quoted local path when the URI
/// resolves to one, `%o` the quoted output file, `%s` the target pixel size
/// and `%%` a literal percent. Unknown placeholders pass through literally.
/// Returns `None` when no input placeholder (`%u`/`%i`) was substituted,
/// since the command could not name its input.
pub fn expand_command_template(
    template: &str,
    size: u32,
    uri: &str,
    outfile: &Path,
) -> Option<String> {
    let mut expanded = String::with_capacity(template.len() + 64);
    let mut got_input = false;
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            expanded.push(ch);
            continue;
        }
        match chars.next() {
            Some('u') => {
                expanded.push_str(&shell_quote(uri));
                got_input = true;
            }
            Some('i') => {
                if let Some(local) = uri_to_local_path(uri) {
                    expanded.push_str(&shell_quote(&local.to_string_lossy()));
                    got_input = true;
                }
            }
            Some('o') => expanded.push_str(&shell_quote(&outfile.to_string_lossy())),
            Some('s') => expanded.push_str(&size.to_string()),
            Some('%') => expanded.push('%'),
            Some(other) => {
                expanded.push('%');
                expanded.push(other);
            }
            None => {}
        }
    }

    got_input.then_some(expanded)
}

/// Quote a string for the shell, single-quote style.
pub(crate) fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Locate an executable on `$PATH`.
pub(crate) fn find_program_in_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_descriptor(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_a_complete_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = write_descriptor(
            &dir,
            "ffmpeg.thumbnailer",
            "[Thumbnailer Entry]\n\
             TryExec=ffmpegthumbnailer\n\
             Exec=ffmpegthumbnailer -i %i -o %o -s %s\n\
             MimeType=video/mp4;video/webm;\n",
        );
        let thumb = Thumbnailer::load(&path).unwrap();
        assert_eq!(thumb.try_exec.as_deref(), Some("ffmpegthumbnailer"));
        assert_eq!(thumb.mime_types, ["video/mp4", "video/webm"]);
        assert!(thumb.exec.contains("%o"));
    }

    #[test]
    fn rejects_descriptors_missing_required_keys() {
        let dir = TempDir::new().unwrap();
        let no_exec = write_descriptor(
            &dir,
            "a.thumbnailer",
            "[Thumbnailer Entry]\nMimeType=image/png;\n",
        );
        let no_mime = write_descriptor(&dir, "b.thumbnailer", "[Thumbnailer Entry]\nExec=x %u\n");
        let no_group = write_descriptor(&dir, "c.thumbnailer", "Exec=x %u\nMimeType=image/png;\n");
        assert!(Thumbnailer::load(&no_exec).is_none());
        assert!(Thumbnailer::load(&no_mime).is_none());
        assert!(Thumbnailer::load(&no_group).is_none());
    }

    #[test]
    fn expands_all_placeholders() {
        let cmd = expand_command_template(
            "gen -i %i -u %u -o %o -s %s -p %% -x %q",
            128,
            "file:///tmp/in.mp4",
            Path::new("/tmp/out.png"),
        )
        .unwrap();
        assert!(cmd.contains("-i '/tmp/in.mp4'"));
        assert!(cmd.contains("-u 'file:///tmp/in.mp4'"));
        assert!(cmd.contains("-o '/tmp/out.png'"));
        assert!(cmd.contains("-s 128"));
        assert!(cmd.contains("-p %"));
        // Unknown placeholders pass through untouched.
        assert!(cmd.contains("-x %q"));
    }

    #[test]
    fn expansion_without_input_placeholder_fails() {
        let cmd = expand_command_template("gen -o %o -s %s", 128, "file:///tmp/a", Path::new("/o"));
        assert!(cmd.is_none());
    }

    #[test]
    fn quotes_shell_metacharacters() {
        let quoted = shell_quote("it's a file; rm -rf");
        assert_eq!(quoted, "'it'\\''s a file; rm -rf'");
        assert_eq!(shell_quote(""), "''");
    }
}
