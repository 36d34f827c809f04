//! Topology command

use clap::{Args, Subcommand, ValueEnum};
use matrix_stack_topology::{DeployableDetails, Topology};
use serde_json::{Map, Value};

use super::{render_structured, OutputFormat};
use crate::config::VerifyConfig;
use crate::{Error, Result};

/// Inspect the chart's deployables
#[derive(Args, Debug)]
pub struct TopologyArgs {
    #[command(subcommand)]
    pub command: TopologyCommand,
}

#[derive(Subcommand, Debug)]
pub enum TopologyCommand {
    /// List every deployable with what it declares
    List {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Deployables rendered when the given components are enabled
    Resolve {
        /// Enabled components
        #[arg(required = true)]
        components: Vec<String>,
    },
    /// CI values files of the top-level components
    ValuesFiles {
        /// Which values files to list
        #[arg(long, value_enum, default_value = "all")]
        kind: ValuesFileKind,
    },
    /// Helm values setting one property on every deployable of the given
    /// components
    Values {
        /// Enabled components
        #[arg(required = true)]
        components: Vec<String>,
        /// Property to set, as `dotted.path=yaml-value`
        #[arg(long = "set", required = true)]
        set: Vec<String>,
        /// Also set it on sub-components configured through their parent
        #[arg(long)]
        include_parent_properties: bool,
    },
}

/// Values file selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ValuesFileKind {
    /// Every component values file
    #[default]
    All,
    /// Values files exercising secret handling
    Secrets,
    /// Values files of components rendering an Ingress
    Ingresses,
}

pub fn run(args: TopologyArgs, config: &VerifyConfig) -> Result<()> {
    let mut topology = Topology::matrix_stack()?;
    config.apply_noqa_paths(&mut topology)?;

    match args.command {
        TopologyCommand::List { format } => println!("{}", list(&topology, format)?),
        TopologyCommand::Resolve { components } => {
            for id in topology.resolve(&components)? {
                println!("{id}");
            }
        }
        TopologyCommand::ValuesFiles { kind } => {
            for file in values_files(&topology, kind) {
                println!("{file}");
            }
        }
        TopologyCommand::Values {
            components,
            set,
            include_parent_properties,
        } => {
            let values = values_overlay(&topology, &components, &set, include_parent_properties)?;
            print!("{}", serde_yaml::to_string(&values)?);
        }
    }
    Ok(())
}

fn list(topology: &Topology, format: OutputFormat) -> Result<String> {
    let deployables: Vec<&DeployableDetails> = topology.iter().collect();
    if format != OutputFormat::Text {
        return render_structured(&deployables, format);
    }

    let flag = |set: bool, name: &str| set.then(|| name.to_string());
    let lines: Vec<String> = deployables
        .iter()
        .map(|d| {
            let parent = d
                .as_sub_component()
                .map(|s| format!(" (in {})", s.parent))
                .unwrap_or_default();
            let flags: Vec<String> = [
                flag(d.has_db, "db"),
                flag(d.has_image, "image"),
                flag(d.has_ingress, "ingress"),
                flag(d.has_workloads, "workloads"),
                flag(d.has_service_monitor, "service-monitor"),
            ]
            .into_iter()
            .flatten()
            .collect();
            format!("{}{parent}  helmKey={}  [{}]", d.name(), d.helm_key, flags.join(","))
        })
        .collect();
    Ok(lines.join("\n"))
}

fn values_files(topology: &Topology, kind: ValuesFileKind) -> Vec<&str> {
    match kind {
        ValuesFileKind::All => topology.values_files_to_test(),
        ValuesFileKind::Secrets => topology.secret_values_files_to_test(),
        ValuesFileKind::Ingresses => topology.values_files_with_ingresses(),
    }
}

/// Values with each `path=value` assignment applied to the Helm values
/// fragment of every deployable the components render
fn values_overlay(
    topology: &Topology,
    components: &[String],
    assignments: &[String],
    include_parent_properties: bool,
) -> Result<Value> {
    let assignments = assignments
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<Result<Vec<_>>>()?;
    let active = topology.resolve(components)?;

    let mut values = Value::Object(Map::new());
    for details in topology.deployables_for_values_mutation(&active, include_parent_properties) {
        let fragment = topology.helm_values_fragment(&details.id, &mut values)?;
        for (path, value) in &assignments {
            set_path(fragment, path, value.clone())?;
        }
    }
    Ok(values)
}

fn parse_assignment(assignment: &str) -> Result<(Vec<&str>, Value)> {
    let (path, raw) = assignment
        .split_once('=')
        .ok_or_else(|| Error::invalid_argument(format!("--set {assignment} is not path=value")))?;
    let path: Vec<&str> = path.split('.').collect();
    if path.iter().any(|segment| segment.is_empty()) {
        return Err(Error::invalid_argument(format!("--set {assignment} has an empty path segment")));
    }
    let value: Value = serde_yaml::from_str(raw)?;
    Ok((path, value))
}

fn set_path(fragment: &mut Map<String, Value>, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };
    let mut current = fragment;
    for segment in parents {
        let child = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = child.as_object_mut().ok_or_else(|| {
            Error::invalid_argument(format!("{} is already set to a non-mapping value", path.join(".")))
        })?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}
