use std::{
    io,
    process::{Command, ExitStatus},
};

use crate::{
    command::{Compiler, Multiplexer},
    config::Config,
    display::{generate_menu_items, unquote_display, MenuItem},
    error::{Error, Result},
    export::parse_export,
    keygen::KeyConverter,
    recent::RecentSessions,
    select_box::Menu,
    session::{usable_sessions, Sessions},
};

/// Runs a compiled command line.
pub trait Launcher {
    fn launch(&self, argv: &[String]) -> io::Result<ExitStatus>;
}

/// Spawns the program directly, without a shell, and waits for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, argv: &[String]) -> io::Result<ExitStatus> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        Command::new(program).args(args).status()
    }
}

/// How a run ended. Every variant is a normal exit for the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Cancelled,
    /// The chosen session has no usable host.
    Unbuildable,
    /// `--dry-run`: the command was printed only.
    Printed,
    /// The launcher could not run the command.
    LaunchFailed,
    Finished { success: bool },
}

pub struct App<M, C, L> {
    config: Config,
    menu: M,
    converter: C,
    launcher: L,
    multiplexer: Multiplexer,
    dry_run: bool,
}

impl<M: Menu, C: KeyConverter, L: Launcher> App<M, C, L> {
    pub fn new(config: Config, menu: M, converter: C, launcher: L, multiplexer: Multiplexer) -> Self {
        App {
            config,
            menu,
            converter,
            launcher,
            multiplexer,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sessions from the export that can be offered, failing when there are none.
    pub fn load_sessions(&self) -> Result<Sessions> {
        let path = &self.config.export_path;
        let sessions = parse_export(path)?;
        if sessions.is_empty() {
            return Err(Error::NoSessions(path.clone()));
        }

        let usable = usable_sessions(&sessions);
        if usable.is_empty() {
            return Err(Error::NoUsableSessions);
        }
        tracing::debug!(total = sessions.len(), usable = usable.len(), "loaded sessions");

        Ok(usable)
    }

    fn open_recent(&self) -> Result<RecentSessions> {
        Ok(RecentSessions::open(
            &self.config.recent_file,
            self.config.recent.retention,
        )?)
    }

    /// Menu entries in display order, as shown by `--list` and the picker.
    pub fn menu_items(&self) -> Result<Vec<MenuItem>> {
        let usable = self.load_sessions()?;
        let recent = self.open_recent()?;
        let visible = recent.visible(&usable, self.config.recent.display_limit);
        Ok(generate_menu_items(&usable, &visible).collect())
    }

    pub fn run(&mut self) -> Result<Outcome> {
        let usable = self.load_sessions()?;
        let mut recent = self.open_recent()?;
        let visible = recent.visible(&usable, self.config.recent.display_limit);
        let items: Vec<MenuItem> = generate_menu_items(&usable, &visible).collect();

        let Some(selected_name) = self.choose(&items)? else {
            println!("\nSelection cancelled.");
            return Ok(Outcome::Cancelled);
        };
        let Some(session) = usable.get(&selected_name) else {
            return Ok(Outcome::Unbuildable);
        };

        let display_name = unquote_display(&selected_name);
        println!("\nSelected: {display_name}");

        let compiler = Compiler::new(&self.config, &self.converter, self.multiplexer);
        // Holds the converted key, if any, until this function returns.
        let Some(compiled) = compiler.compile(&display_name, session)? else {
            eprintln!("Cannot build ssh command (missing hostname?).");
            return Ok(Outcome::Unbuildable);
        };

        println!("Command: {}\n", compiled.wrapper);
        if self.dry_run {
            return Ok(Outcome::Printed);
        }

        let argv = match compiled.argv() {
            Ok(argv) => argv,
            Err(e) => {
                tracing::error!(error = %e, "Could not parse command");
                return Ok(Outcome::LaunchFailed);
            }
        };

        let status = match self.launcher.launch(&argv) {
            Ok(status) => status,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::error!(program = %argv[0], "'{}' not found, please install it", argv[0]);
                return Ok(Outcome::LaunchFailed);
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not run command");
                return Ok(Outcome::LaunchFailed);
            }
        };

        if status.success() {
            if let Err(e) = recent.record(&selected_name) {
                tracing::warn!(error = %e, "Could not update recent sessions");
            }
        } else {
            tracing::info!(%status, "Connection exited unsuccessfully");
        }

        Ok(Outcome::Finished {
            success: status.success(),
        })
    }

    /// Shows the menu until a session is picked; headers are not accepted.
    fn choose(&mut self, items: &[MenuItem]) -> Result<Option<String>> {
        loop {
            let Some(index) = self.menu.show(items)? else {
                return Ok(None);
            };
            match items.get(index).and_then(MenuItem::session_name) {
                Some(name) => return Ok(Some(name.to_string())),
                None => eprintln!("Invalid selection (separator). Please choose again."),
            }
        }
    }
}
