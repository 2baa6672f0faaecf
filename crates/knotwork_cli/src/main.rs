// SPDX-License-Identifier: MIT OR Apache-2.0
//! `knotwork` - inspect node-graph documents from the command line.
//!
//! Opens a document, reports what it holds and prints the evaluation order of
//! its root graph.
//!
//! ```text
//! knotwork <document.json> [--config settings.ron] [--from NAME]... [--bottom-up]
//! ```
//!
//! Node types are not known to this tool, so every node is loaded with an
//! unbounded, single-output definition.

use clap::Parser;
use knotwork_graph::{
    DefaultItemFactory, Document, DocumentConfig, DocumentError, GraphItem, GraphRef, InputArity, ItemId,
    LoopError, NodeRegistry, NodeTypeDef, TraverseDirection,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no node named {0:?} in the root graph")]
    UnknownNode(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Loop(#[from] LoopError),
}

#[derive(Parser, Debug)]
#[command(name = "knotwork", about = "Print the evaluation order of a node-graph document", long_about = None)]
struct Args {
    /// Document to open
    document: PathBuf,

    /// RON settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Start the traversal at the node with this name (repeatable)
    #[arg(long, value_name = "NAME")]
    from: Vec<String>,

    /// Walk from consumers towards producers
    #[arg(long)]
    bottom_up: bool,
}

fn node_name(graph: &GraphRef<'_>, id: ItemId) -> String {
    graph
        .get(id)
        .and_then(GraphItem::as_node)
        .map_or_else(|| id.to_string(), |node| node.name.clone())
}

/// Nodes with nothing upstream (top-down) or nothing downstream (bottom-up)
fn default_start(graph: &GraphRef<'_>, direction: TraverseDirection) -> Vec<ItemId> {
    graph
        .nodes()
        .filter(|&id| match direction {
            TraverseDirection::TopDown => graph.connected_input_count(id) == 0,
            TraverseDirection::BottomUp => !graph.links().any(|(_, ic)| ic.source_item == id),
        })
        .collect()
}

fn run(args: Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => DocumentConfig::load(path)?,
        None => DocumentConfig::default(),
    };

    let mut registry = NodeRegistry::new();
    registry.set_fallback(Some(NodeTypeDef::new("unknown").pins(InputArity::Unbounded, 1)));
    let doc = Document::open(
        &args.document,
        Arc::new(registry),
        Arc::new(DefaultItemFactory),
        config,
    )?;

    let root = doc.root_graph();
    tracing::info!(
        "opened {:?}: {} items, {} links, {} graphs",
        doc.title(),
        doc.item_count(),
        root.link_count(),
        doc.graph_ids().count()
    );

    let direction = if args.bottom_up {
        TraverseDirection::BottomUp
    } else {
        TraverseDirection::TopDown
    };
    let start = if args.from.is_empty() {
        default_start(&root, direction)
    } else {
        args.from
            .iter()
            .map(|name| {
                root.nodes()
                    .find(|&id| node_name(&root, id) == *name)
                    .ok_or_else(|| CliError::UnknownNode(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    let order = root.traverse(&start, direction, false)?;
    for node in order.iter() {
        let inputs: Vec<String> = node
            .inputs()
            .iter()
            .map(|slot| slot.map_or_else(|| "-".to_owned(), |i| node_name(&root, order.nodes()[i])))
            .collect();
        println!(
            "{:>4}  {:<24} <- [{}]",
            node.index(),
            node_name(&root, node.id()),
            inputs.join(", ")
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "knotwork_graph=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("knotwork").chain(list.iter().copied()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["doc.json", "--from", "a", "--from", "b", "--bottom-up"]).unwrap();
        assert_eq!(parsed.document, PathBuf::from("doc.json"));
        assert_eq!(parsed.from, vec!["a", "b"]);
        assert!(parsed.bottom_up);
        assert!(parsed.config.is_none());

        let parsed = args(&["--config", "settings.ron", "doc.json"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("settings.ron")));
        assert!(parsed.from.is_empty());
        assert!(!parsed.bottom_up);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        use clap::error::ErrorKind;

        let kind = |list: &[&str]| args(list).map(|_| ()).unwrap_err().kind();
        assert_eq!(kind(&[]), ErrorKind::MissingRequiredArgument);
        assert_eq!(kind(&["doc.json", "--config"]), ErrorKind::InvalidValue);
        assert_eq!(kind(&["a.json", "b.json"]), ErrorKind::UnknownArgument);
        assert_eq!(kind(&["a.json", "--verbose"]), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_command_is_well_formed() {
        use clap::CommandFactory;

        Args::command().debug_assert();
    }
}
