//! Check command

use std::path::{Path, PathBuf};

use clap::{ArgGroup, Args};
use matrix_stack_topology::Topology;
use matrix_stack_verify::{CheckName, RenderedChart, Report, Verifier};
use tracing::info;

use super::{load_manifests, render_structured, OutputFormat, STDIN};
use crate::config::VerifyConfig;
use crate::{Error, Result};

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("active").required(true).args(["values_file", "components"])))]
pub struct CheckArgs {
    /// Rendered manifests (`helm template` output), `-` for stdin
    #[arg(short, long, default_value = STDIN)]
    pub manifests: PathBuf,

    /// Secrets expected to exist before install (repeatable)
    #[arg(long = "external-secrets")]
    pub external_secrets: Vec<PathBuf>,

    /// CI values file the render was made with; selects the active components
    #[arg(long, env = "MATRIX_STACK_VALUES_FILE")]
    pub values_file: Option<PathBuf>,

    /// Component enabled in the render (repeatable)
    #[arg(long = "component")]
    pub components: Vec<String>,

    /// Helm release name of the render [default: from config, or pytest]
    #[arg(long, env = "MATRIX_STACK_RELEASE_NAME")]
    pub release_name: Option<String>,

    /// Skip a check (repeatable)
    #[arg(long = "disable")]
    pub disabled: Vec<CheckName>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub fn run(args: CheckArgs, config: &VerifyConfig) -> Result<()> {
    let report = verify(&args, config)?;

    match args.format {
        OutputFormat::Text => println!("{report}"),
        format => println!("{}", render_structured(&report, format)?),
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{} violation(s) in {}",
            report.len(),
            args.manifests.display()
        )))
    }
}

/// Load the render and run every enabled check
pub fn verify(args: &CheckArgs, config: &VerifyConfig) -> Result<Report> {
    let mut topology = Topology::matrix_stack()?;
    config.apply_noqa_paths(&mut topology)?;

    let active = active_components(&topology, args)?;
    info!(components = ?active, manifests = %args.manifests.display(), "verifying render");

    let chart = RenderedChart::classify(
        &topology,
        &active,
        load_manifests(&[&args.manifests])?,
        load_manifests(&args.external_secrets)?,
    )?;

    let release_name = args
        .release_name
        .as_deref()
        .unwrap_or_else(|| config.release_name());
    let verifier = Verifier::new(&topology, release_name).with_disabled(
        config
            .disabled_checks
            .iter()
            .chain(&args.disabled)
            .copied(),
    );
    Ok(verifier.run(&chart)?)
}

/// Components named on the command line, or the one owning the values file
fn active_components(topology: &Topology, args: &CheckArgs) -> Result<Vec<String>> {
    if !args.components.is_empty() {
        return Ok(args.components.clone());
    }
    let values_file = args
        .values_file
        .as_deref()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::invalid_argument("--values-file or --component is required"))?;
    let component = topology.component_for_values_file(values_file)?;
    Ok(vec![component.name().to_string()])
}
