//! Shell-argument escaping.
//!
//! [`super::SystemRunner`] passes arguments verbatim, so these rules are used
//! for rendering command lines in verbose output and by shell-backed
//! [`super::ProcessRunner`] implementations. POSIX shells and Windows `cmd`
//! have incompatible quoting rules, and `cmd` additionally expands
//! `%VAR%` sequences even inside double quotes, so `%` must be bracketed out
//! of any quoted run.

/// Escape for POSIX shells: single-quote wrapping, with embedded single
/// quotes spliced as `'\''`.
pub fn escape_posix(arg: &str) -> String {
    if !arg.is_empty() && arg.bytes().all(is_posix_safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn is_posix_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'-' | b'_' | b'.' | b'/' | b'=' | b':' | b'@' | b'+' | b','
        )
}

/// Escape for Windows `cmd`-style invocation: double-quote wrapping with
/// backslash doubling before quotes, embedded quotes as `\"`, and every `%`
/// bracketed (`"%"`) so environment-variable expansion cannot fire.
pub fn escape_windows(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for ch in arg.chars() {
        match ch {
            '\\' => backslashes += 1,
            '"' => {
                // backslashes preceding a quote must be doubled, plus one to
                // escape the quote itself
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            other => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                backslashes = 0;
                quoted.push(other);
            }
        }
    }
    // trailing backslashes precede the closing quote
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted.replace('%', "\"%\"")
}

/// Escape for the current platform.
pub fn escape(arg: &str) -> String {
    if cfg!(windows) {
        escape_windows(arg)
    } else {
        escape_posix(arg)
    }
}

/// Render a program and its arguments as a single display-safe command line.
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut rendered = escape(program);
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&escape(arg));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_plain_arguments_pass_through() {
        assert_eq!(escape_posix("-p1"), "-p1");
        assert_eq!(escape_posix("/usr/bin/patch"), "/usr/bin/patch");
    }

    #[test]
    fn posix_quoting() {
        assert_eq!(escape_posix(""), "''");
        assert_eq!(escape_posix("a b"), "'a b'");
        assert_eq!(escape_posix("it's"), r"'it'\''s'");
        assert_eq!(escape_posix("$HOME"), "'$HOME'");
    }

    #[test]
    fn windows_quoting() {
        assert_eq!(escape_windows("plain"), "\"plain\"");
        assert_eq!(escape_windows("a b"), "\"a b\"");
        assert_eq!(escape_windows(r#"say "hi""#), r#""say \"hi\"""#);
        // backslashes before an embedded quote are doubled
        assert_eq!(escape_windows(r#"c:\dir\"x"#), r#""c:\dir\\\"x""#);
        // trailing backslashes are doubled before the closing quote
        assert_eq!(escape_windows(r"c:\dir\"), r#""c:\dir\\""#);
    }

    #[test]
    fn windows_percent_is_bracketed() {
        assert_eq!(escape_windows("%PATH%"), "\"\"%\"PATH\"%\"\"");
        assert!(!escape_windows("100%").contains("100%\""));
    }

    #[test]
    fn render_joins_escaped_arguments() {
        let rendered = render_command("patch", &["-p1".to_string(), "my file".to_string()]);
        if cfg!(windows) {
            assert_eq!(rendered, "\"patch\" \"-p1\" \"my file\"");
        } else {
            assert_eq!(rendered, "patch -p1 'my file'");
        }
    }
}
