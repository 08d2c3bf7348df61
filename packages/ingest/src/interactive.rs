//! Menu-driven command selection for running the tool without flags.

use dialoguer::{Confirm, Input, Select};

use crate::{Commands, RunArgs};

/// Top-level actions offered by the menu.
enum Action {
    Run,
    Status,
    Plan,
    Probe,
    ListSources,
    Migrate,
    Reset,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Run,
        Self::Status,
        Self::Plan,
        Self::Probe,
        Self::ListSources,
        Self::Migrate,
        Self::Reset,
    ];

    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Run or resume the campaign",
            Self::Status => "Show campaign status",
            Self::Plan => "Show the work unit plan",
            Self::Probe => "Probe one page",
            Self::ListSources => "List sources",
            Self::Migrate => "Create company tables",
            Self::Reset => "Delete all companies",
        }
    }
}

/// Prompts for an action and the few options it needs.
///
/// # Errors
///
/// Returns [`dialoguer::Error`] if the terminal cannot be prompted.
pub fn choose_command() -> Result<Commands, dialoguer::Error> {
    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(match Action::ALL[idx] {
        Action::Run => {
            let mut args = RunArgs::default();
            args.upsert_concurrency = Input::new()
                .with_prompt("Concurrent upserts per page")
                .default(args.upsert_concurrency)
                .interact_text()?;
            args.no_archive = !Confirm::new()
                .with_prompt("Archive raw responses?")
                .default(true)
                .interact()?;
            Commands::Run(args)
        }
        Action::Status => Commands::Status {
            tables: Confirm::new()
                .with_prompt("Include table row counts?")
                .default(false)
                .interact()?,
        },
        Action::Plan => Commands::Plan,
        Action::Probe => Commands::Probe {
            prefix: Input::new()
                .with_prompt("Name prefix")
                .allow_empty(true)
                .interact_text()?,
            offset: 0,
            size: 10,
            proxy: None,
        },
        Action::ListSources => Commands::Sources,
        Action::Migrate => Commands::Migrate,
        Action::Reset => Commands::Reset {
            yes: false,
            checkpoints: Confirm::new()
                .with_prompt("Also clear checkpoints?")
                .default(false)
                .interact()?,
        },
    })
}

/// Asks before deleting stored companies.
///
/// # Errors
///
/// Returns [`dialoguer::Error`] if the terminal cannot be prompted.
pub fn confirm_reset(checkpoints: bool) -> Result<bool, dialoguer::Error> {
    let prompt = if checkpoints {
        "Delete every stored company and all checkpoints?"
    } else {
        "Delete every stored company?"
    };
    Confirm::new().with_prompt(prompt).default(false).interact()
}
