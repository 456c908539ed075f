use anyhow::{bail, Context, Result};
use appreg::selftest::{self, DEFAULT_COMPANY, DEFAULT_PROJECT};
use appreg::{
    access_hint, remove_namespace, HandleOptions, Object, RegistryBackend, RegistryError,
    RegistryHandle, ValueType,
};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "appreg",
    version,
    about = "Per-application configuration under HKLM\\Software\\<company>\\<project>"
)]
struct Cli {
    /// First namespace segment
    #[arg(long, global = true)]
    company: Option<String>,

    /// Second namespace segment
    #[arg(long, global = true)]
    project: Option<String>,

    /// Only open an existing key; never create it
    #[arg(long, global = true)]
    no_create: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a named value and its type
    Get { name: String },
    /// Write a named value
    Set {
        name: String,
        value: String,
        #[arg(long = "type", value_enum, default_value_t = Kind::Sz)]
        kind: Kind,
    },
    /// Print the default value of a subkey
    GetDefault { subkey: String },
    /// Write the default value of a subkey
    SetDefault { subkey: String, value: String },
    /// Decode and print an object stored in a subkey's default value
    GetObject { subkey: String },
    /// Encode a JSON value and store it as a subkey's default value.
    ///
    /// Arrays become tuples and `{"re": 1, "im": 2}` a complex number.
    SetObject { subkey: String, json: String },
    /// Delete a named value
    DeleteValue { name: String },
    /// Delete a subkey without subkeys of its own
    DeleteSubkey { subkey: String },
    /// Show how the key was opened
    Info {
        #[arg(long)]
        json: bool,
    },
    /// Delete the project key, and the company key once it is empty
    Remove,
    /// Exercise every operation in a throwaway namespace and remove it
    Selftest {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Sz,
    Expand,
    Multi,
    Dword,
    Qword,
}

impl From<Kind> for ValueType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Sz => Self::String,
            Kind::Expand => Self::ExpandString,
            Kind::Multi => Self::MultiString,
            Kind::Dword => Self::Dword,
            Kind::Qword => Self::Qword,
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(windows)]
fn backend() -> Result<appreg::WindowsRegistry> {
    Ok(appreg::WindowsRegistry::local_machine())
}

#[cfg(not(windows))]
fn backend() -> Result<appreg::MemoryRegistry> {
    bail!("the Windows registry is only available on Windows")
}

fn namespace(cli: &Cli) -> Result<(&str, &str)> {
    match (cli.company.as_deref(), cli.project.as_deref()) {
        (Some(company), Some(project)) => Ok((company, project)),
        _ => bail!("--company and --project are required"),
    }
}

fn open<B: RegistryBackend>(backend: B, cli: &Cli) -> Result<RegistryHandle<B>> {
    let (company, project) = namespace(cli)?;
    let options = HandleOptions {
        create_if_missing: !cli.no_create,
    };
    RegistryHandle::open_with(backend, company, project, options)
        .with_context(|| format!("Failed to open Software\\{company}\\{project}"))
}

fn execute<B: RegistryBackend + Clone>(backend: B, cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Get { name } => {
            let (data, ty) = open(backend, cli)?.get_value(name)?;
            println!("{data}\t{ty} ({})", ty.tag());
        }
        Command::Set { name, value, kind } => {
            open(backend, cli)?.set_value_as(name, value.as_str(), ValueType::from(*kind))?;
        }
        Command::GetDefault { subkey } => {
            println!("{}", open(backend, cli)?.get_default(subkey)?);
        }
        Command::SetDefault { subkey, value } => {
            open(backend, cli)?.set_default(subkey, value)?;
        }
        Command::GetObject { subkey } => {
            let object = open(backend, cli)?.get_decoded(subkey)?;
            println!("{object}\t{}", object.kind());
        }
        Command::SetObject { subkey, json } => {
            let value: serde_json::Value =
                serde_json::from_str(json).context("Value is not valid JSON")?;
            let object = Object::try_from(&value)?;
            open(backend, cli)?.set_encoded(subkey, &object)?;
        }
        Command::DeleteValue { name } => open(backend, cli)?.delete_value(name)?,
        Command::DeleteSubkey { subkey } => open(backend, cli)?.delete_subkey(subkey)?,
        Command::Info { json } => {
            let info = open(backend, cli)?.info();
            if *json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("path:    HKLM\\{}", info.path);
                println!("access:  {}", info.access_name);
                println!("writable: {}", info.writable);
            }
        }
        Command::Remove => {
            let (company, project) = namespace(cli)?;
            remove_namespace(&backend, company, project)?;
        }
        Command::Selftest { json } => {
            let company = cli.company.as_deref().unwrap_or(DEFAULT_COMPANY);
            let project = cli.project.as_deref().unwrap_or(DEFAULT_PROJECT);
            let report = selftest::run(&backend, company, project)?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for step in &report.steps {
                    let status = if step.passed { "ok" } else { "FAILED" };
                    match &step.detail {
                        Some(detail) => println!("{:<24} {status}: {detail}", step.name),
                        None => println!("{:<24} {status}", step.name),
                    }
                }
            }
            if !report.passed() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match backend().and_then(|backend| execute(backend, &cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let denied = e
                .downcast_ref::<RegistryError>()
                .is_some_and(|e| {
                    e.is_access_denied() || matches!(e, RegistryError::CreationFailed(_))
                });
            if let Some(hint) = access_hint().filter(|_| denied) {
                eprintln!("{hint}");
            }
            ExitCode::FAILURE
        }
    }
}
