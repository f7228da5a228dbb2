//! Turns a session into the `ssh` command line and the tmux wrapper that runs it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, Local};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::keygen::{KeyConverter, TempKey};
use crate::session::{
    Session, DEFAULT_PORT, PROTOCOL, PROXY_HOST, PROXY_METHOD, PROXY_PORT, PROXY_USERNAME,
};

/// `ProxyMethod` value PuTTY uses for "local command", compiled to `ssh -J`.
const PROXY_METHOD_JUMP: &str = "6";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M";

/// Whether the tool runs inside an existing tmux session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplexer {
    Attached,
    Detached,
}

impl Multiplexer {
    pub fn from_env() -> Self {
        match std::env::var_os("TMUX") {
            Some(value) if !value.is_empty() => Multiplexer::Attached,
            _ => Multiplexer::Detached,
        }
    }
}

/// Output of [`Compiler::compile`].
#[derive(Debug)]
pub struct CompiledCommand {
    /// The bare ssh invocation, one entry per argument.
    pub tokens: Vec<String>,
    /// `tokens` joined with spaces.
    pub base: String,
    /// tmux invocation running `base` in a named, logged window.
    pub wrapper: String,
    pub log_file: PathBuf,
    /// Converted key referenced by `-i`; deleted when dropped.
    ///
    /// Inside an existing tmux session `tmux new-window` returns as soon as the window
    /// exists, so the key can be gone before ssh in that window reads it.
    pub temp_key: Option<TempKey>,
}

impl CompiledCommand {
    pub fn temp_key_path(&self) -> Option<&Path> {
        self.temp_key.as_ref().map(TempKey::path)
    }

    /// The wrapper split back into an argument vector.
    pub fn argv(&self) -> Result<Vec<String>> {
        split_words(&self.wrapper)
    }
}

pub struct Compiler<'a, C> {
    config: &'a Config,
    converter: &'a C,
    multiplexer: Multiplexer,
}

impl<'a, C: KeyConverter> Compiler<'a, C> {
    pub fn new(config: &'a Config, converter: &'a C, multiplexer: Multiplexer) -> Self {
        Self {
            config,
            converter,
            multiplexer,
        }
    }

    /// Builds the command for `session`, or `None` when it has no host.
    pub fn compile(&self, session_name: &str, session: &Session) -> Result<Option<CompiledCommand>> {
        self.compile_at(session_name, session, Local::now())
    }

    pub fn compile_at(
        &self,
        session_name: &str,
        session: &Session,
        now: DateTime<Local>,
    ) -> Result<Option<CompiledCommand>> {
        let Some(host) = session.host() else {
            return Ok(None);
        };

        let mut tokens = vec![self.config.ssh_program.clone()];

        match session.get_trimmed(PROTOCOL).map(str::to_ascii_lowercase).as_deref() {
            Some("ssh1") => tokens.push("-1".to_string()),
            Some("ssh2") => tokens.push("-2".to_string()),
            _ => {}
        }

        let remote_command = session.remote_command();
        if remote_command.is_some() {
            tokens.push("-t".to_string());
        }

        if !session.has_default_port() {
            tokens.extend(["-p".to_string(), session.port().to_string()]);
        }

        if let Some(jump) = jump_host(session) {
            tokens.extend(["-J".to_string(), jump]);
        }

        tokens.push(user_at(session.user(), host));

        let temp_key = match session.key_file() {
            Some(key_file) => self.convert_key(key_file),
            None => None,
        };
        if let Some(key) = &temp_key {
            tokens.extend(["-i".to_string(), key.path().display().to_string()]);
        }

        if let Some(remote_command) = remote_command {
            tokens.push(format!("\"{}\"", remote_command));
        }

        let base = tokens.join(" ");
        let safe_name = session_name.replace('\'', "");
        let log_file = self.log_file(&safe_name, now)?;
        let wrapper = self.wrapper(&safe_name, &base, &log_file);

        Ok(Some(CompiledCommand {
            tokens,
            base,
            wrapper,
            log_file,
            temp_key,
        }))
    }

    fn convert_key(&self, key_file: &str) -> Option<TempKey> {
        let Some(ppk) = resolve_key_file(key_file, &self.config.export_dir(), &self.config.mount_root)
        else {
            tracing::warn!(key = key_file, "Key file not found");
            return None;
        };

        tracing::info!(key = %ppk.display(), "Using key");
        match self.converter.convert(&ppk) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(error = %e, "Key conversion failed, will prompt for password");
                None
            }
        }
    }

    fn log_file(&self, safe_name: &str, now: DateTime<Local>) -> Result<PathBuf> {
        let log_dir = &self.config.log_dir;
        fs::create_dir_all(log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;

        let file_name = format!(
            "{}-{}.log",
            now.format(TIMESTAMP_FORMAT),
            safe_name.replace('/', "_")
        );
        Ok(log_dir.join(file_name))
    }

    fn wrapper(&self, safe_name: &str, base: &str, log_file: &Path) -> String {
        let tmux = &self.config.multiplexer_program;
        let base = base.replace('\'', r"'\''");
        let pipe = format!("pipe-pane -o 'cat >> \"{}\"'", log_file.display());

        match self.multiplexer {
            Multiplexer::Attached => {
                format!("{tmux} new-window -n '{safe_name}' '{base}' \\; {pipe}")
            }
            Multiplexer::Detached => format!(
                "{tmux} new-session -n '{safe_name}' '{base}' \\; set-option destroy-unattached on \\; {pipe}"
            ),
        }
    }
}

fn user_at(user: Option<&str>, host: &str) -> String {
    match user {
        Some(user) => format!("{user}@{host}"),
        None => host.to_string(),
    }
}

/// `[user@]host[:port]` for `ssh -J`, when the session proxies through a jump host.
fn jump_host(session: &Session) -> Option<String> {
    if session.get_trimmed(PROXY_METHOD) != Some(PROXY_METHOD_JUMP) {
        return None;
    }
    let host = session.get_trimmed(PROXY_HOST)?;

    let mut jump = user_at(session.get_trimmed(PROXY_USERNAME), host);
    if let Some(port) = session.get_trimmed(PROXY_PORT).filter(|p| *p != DEFAULT_PORT) {
        jump.push(':');
        jump.push_str(port);
    }
    Some(jump)
}

/// Finds the key file: as given, relative to the export, then as a Windows drive path
/// under `mount_root` (`C:\keys\a.ppk` -> `/mnt/c/keys/a.ppk`).
pub fn resolve_key_file(key_file: &str, export_dir: &Path, mount_root: &Path) -> Option<PathBuf> {
    let literal = PathBuf::from(key_file);
    let relative = export_dir.join(key_file);
    let mounted = mounted_path(key_file, mount_root);

    [Some(literal), Some(relative), mounted]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.is_file())
}

fn mounted_path(key_file: &str, mount_root: &Path) -> Option<PathBuf> {
    let head: String = key_file.chars().take(3).collect();
    if !head.contains(':') || !key_file.contains('\\') {
        return None;
    }

    let (drive, rest) = key_file.split_once(':')?;
    let rest = rest.trim_start_matches('\\').replace('\\', "/");
    Some(mount_root.join(drive.to_lowercase()).join(rest))
}

/// Splits a command line into words, honouring single quotes, double quotes and
/// backslash escapes.
pub fn split_words(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                in_word = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                in_word = true;
            }
            '\\' if !in_single => {
                if let Some(next) = chars.next() {
                    if in_double && !matches!(next, '"' | '\\' | '$' | '`') {
                        current.push('\\');
                    }
                    current.push(next);
                }
                in_word = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_single || in_double {
        return Err(Error::UnparsableCommand(input.to_string()));
    }
    if in_word {
        words.push(current);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::ConvertError;
    use crate::session::{
        HOST_NAME, PORT_NUMBER, PUBLIC_KEY_FILE, REMOTE_COMMAND, USER_NAME,
    };
    use chrono::TimeZone;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Records the requested path and hands out a key inside a scratch directory.
    struct FakeConverter {
        dir: TempDir,
        fail: bool,
        requested: RefCell<Vec<PathBuf>>,
    }

    impl FakeConverter {
        fn new(fail: bool) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                fail,
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl KeyConverter for FakeConverter {
        fn convert(&self, ppk: &Path) -> std::result::Result<TempKey, ConvertError> {
            self.requested.borrow_mut().push(ppk.to_path_buf());
            if self.fail {
                return Err(ConvertError::Io(std::io::Error::other("boom")));
            }
            let path = tempfile::Builder::new()
                .suffix(".key")
                .tempfile_in(self.dir.path())?
                .into_temp_path();
            Ok(TempKey::new(path))
        }
    }

    struct Fixture {
        root: TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let config = Config {
                export_path: root.path().join("export").join("putty.reg"),
                log_dir: root.path().join("logs"),
                mount_root: root.path().join("mnt"),
                ..Config::default()
            };
            Self { root, config }
        }
    }

    fn session(pairs: &[(&str, &str)]) -> Session {
        pairs.iter().copied().collect()
    }

    fn compile(
        fixture: &Fixture,
        converter: &FakeConverter,
        multiplexer: Multiplexer,
        name: &str,
        session: &Session,
    ) -> Option<CompiledCommand> {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        Compiler::new(&fixture.config, converter, multiplexer)
            .compile_at(name, session, now)
            .unwrap()
    }

    fn has_pair(tokens: &[String], flag: &str, value: &str) -> bool {
        tokens.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_default_port_plain_host() {
        let fixture = Fixture::new();
        let converter = FakeConverter::new(false);
        let s = session(&[(HOST_NAME, "box"), (PORT_NUMBER, "22")]);

        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "web", &s).unwrap();
        assert_eq!(cmd.tokens, vec!["ssh", "box"]);
        assert_eq!(cmd.base, "ssh box");
        assert!(cmd.temp_key.is_none());
    }

    #[test]
    fn test_missing_host_cannot_build() {
        let fixture = Fixture::new();
        let converter = FakeConverter::new(false);
        let s = session(&[(HOST_NAME, "  "), (USER_NAME, "u")]);

        assert!(compile(&fixture, &converter, Multiplexer::Detached, "x", &s).is_none());
    }

    #[test]
    fn test_port_and_user() {
        let fixture = Fixture::new();
        let converter = FakeConverter::new(false);
        let s = session(&[(HOST_NAME, "h"), (USER_NAME, "u"), (PORT_NUMBER, "2222")]);

        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &s).unwrap();
        assert!(has_pair(&cmd.tokens, "-p", "2222"));
        assert_eq!(cmd.tokens.last().map(String::as_str), Some("u@h"));
    }

    #[test]
    fn test_jump_host() {
        let fixture = Fixture::new();
        let converter = FakeConverter::new(false);
        let s = session(&[
            (HOST_NAME, "h"),
            (PROXY_METHOD, "6"),
            (PROXY_HOST, "jump"),
            (PROXY_USERNAME, "j"),
        ]);
        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &s).unwrap();
        assert!(has_pair(&cmd.tokens, "-J", "j@jump"));
        assert_eq!(cmd.base, "ssh -J j@jump h");

        let with_port = session(&[
            (HOST_NAME, "h"),
            (PROXY_METHOD, "6"),
            (PROXY_HOST, "jump"),
            (PROXY_PORT, "2200"),
        ]);
        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &with_port).unwrap();
        assert!(has_pair(&cmd.tokens, "-J", "jump:2200"));

        let other_method = session(&[(HOST_NAME, "h"), (PROXY_METHOD, "5"), (PROXY_HOST, "jump")]);
        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &other_method).unwrap();
        assert!(!cmd.tokens.contains(&"-J".to_string()));
    }

    #[test]
    fn test_protocol_and_remote_command_follow_program() {
        let fixture = Fixture::new();
        let converter = FakeConverter::new(false);
        let s = session(&[
            (HOST_NAME, "h"),
            (PORT_NUMBER, "2022"),
            (PROTOCOL, "SSH2"),
            (REMOTE_COMMAND, "htop"),
        ]);

        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &s).unwrap();
        assert_eq!(cmd.base, "ssh -2 -t -p 2022 h \"htop\"");

        let ssh1 = session(&[(HOST_NAME, "h"), (PROTOCOL, "ssh1")]);
        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &ssh1).unwrap();
        assert_eq!(cmd.base, "ssh -1 h");
    }

    #[test]
    fn test_missing_key_is_not_fatal() {
        let fixture = Fixture::new();
        let converter = FakeConverter::new(false);
        let s = session(&[(HOST_NAME, "h"), (PUBLIC_KEY_FILE, "/nonexistent/key.ppk")]);

        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &s).unwrap();
        assert!(!cmd.tokens.contains(&"-i".to_string()));
        assert!(cmd.temp_key_path().is_none());
        assert!(converter.requested.borrow().is_empty());
    }

    #[test]
    fn test_relative_key_is_converted_and_cleaned_up() {
        let fixture = Fixture::new();
        let export_dir = fixture.config.export_dir();
        fs::create_dir_all(&export_dir).unwrap();
        fs::write(export_dir.join("web.ppk"), "ppk").unwrap();
        let converter = FakeConverter::new(false);
        let s = session(&[(HOST_NAME, "h"), (PUBLIC_KEY_FILE, "web.ppk")]);

        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &s).unwrap();
        let key_path = cmd.temp_key_path().unwrap().to_path_buf();
        assert!(has_pair(&cmd.tokens, "-i", &key_path.display().to_string()));
        assert_eq!(converter.requested.borrow()[0], export_dir.join("web.ppk"));
        assert!(key_path.exists());

        drop(cmd);
        assert!(!key_path.exists());
    }

    #[test]
    fn test_failed_conversion_proceeds_without_key() {
        let fixture = Fixture::new();
        let key = fixture.root.path().join("k.ppk");
        fs::write(&key, "ppk").unwrap();
        let converter = FakeConverter::new(true);
        let s = session(&[(HOST_NAME, "h"), (PUBLIC_KEY_FILE, key.to_str().unwrap())]);

        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "x", &s).unwrap();
        assert_eq!(converter.requested.borrow().len(), 1);
        assert_eq!(cmd.base, "ssh h");
        assert!(cmd.temp_key.is_none());
    }

    #[test]
    fn test_resolve_windows_drive_path() {
        let root = tempfile::tempdir().unwrap();
        let mount_root = root.path().join("mnt");
        let target = mount_root.join("c").join("Users").join("me").join("a.ppk");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "ppk").unwrap();

        let resolved = resolve_key_file(r"C:\Users\me\a.ppk", root.path(), &mount_root);
        assert_eq!(resolved, Some(target));

        assert_eq!(resolve_key_file(r"D:\none.ppk", root.path(), &mount_root), None);
    }

    #[test]
    fn test_mounted_path_requires_drive_and_backslash() {
        let root = Path::new("/mnt");
        assert_eq!(
            mounted_path(r"E:\\keys\x.ppk", root),
            Some(PathBuf::from("/mnt/e/keys/x.ppk"))
        );
        assert_eq!(mounted_path("keys/x.ppk", root), None);
        assert_eq!(mounted_path("abcd:\\x", root), None);
    }

    #[test]
    fn test_wrapper_detached() {
        let fixture = Fixture::new();
        let converter = FakeConverter::new(false);
        let s = session(&[(HOST_NAME, "h")]);

        let cmd = compile(&fixture, &converter, Multiplexer::Detached, "bob's box", &s).unwrap();
        let log_file = fixture.config.log_dir.join("2024-03-09_1405-bobs box.log");
        assert_eq!(cmd.log_file, log_file);
        assert!(fixture.config.log_dir.is_dir());
        assert_eq!(
            cmd.argv().unwrap(),
            vec![
                "tmux".to_string(),
                "new-session".into(),
                "-n".into(),
                "bobs box".into(),
                "ssh h".into(),
                ";".into(),
                "set-option".into(),
                "destroy-unattached".into(),
                "on".into(),
                ";".into(),
                "pipe-pane".into(),
                "-o".into(),
                format!("cat >> \"{}\"", log_file.display()),
            ]
        );
    }

    #[test]
    fn test_wrapper_attached_keeps_quoted_remote_command() {
        let fixture = Fixture::new();
        let converter = FakeConverter::new(false);
        let s = session(&[(HOST_NAME, "h"), (REMOTE_COMMAND, "echo 'hi'")]);

        let cmd = compile(&fixture, &converter, Multiplexer::Attached, "web", &s).unwrap();
        let argv = cmd.argv().unwrap();
        assert_eq!(&argv[..5], ["tmux", "new-window", "-n", "web", "ssh -t h \"echo 'hi'\""]);
        assert_eq!(argv[5], ";");
        assert_eq!(argv[6], "pipe-pane");
    }

    #[test]
    fn test_split_words() {
        assert_eq!(
            split_words(r#"a 'b c' "d \"e\"" f\ g"#).unwrap(),
            vec!["a", "b c", "d \"e\"", "f g"]
        );
        assert_eq!(split_words("x ''").unwrap(), vec!["x", ""]);
        assert!(matches!(
            split_words("a 'open"),
            Err(Error::UnparsableCommand(_))
        ));
    }

    #[test]
    fn test_multiplexer_from_env() {
        let saved = std::env::var_os("TMUX");

        std::env::set_var("TMUX", "/tmp/tmux-1000/default,123,0");
        assert_eq!(Multiplexer::from_env(), Multiplexer::Attached);
        std::env::set_var("TMUX", "");
        assert_eq!(Multiplexer::from_env(), Multiplexer::Detached);
        std::env::remove_var("TMUX");
        assert_eq!(Multiplexer::from_env(), Multiplexer::Detached);

        match saved {
            Some(value) => std::env::set_var("TMUX", value),
            None => std::env::remove_var("TMUX"),
        }
    }
}
