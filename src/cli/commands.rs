//! Command dispatch: one function per subcommand.

use std::io;

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::parse_insertion_position;
use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands, ConfigCommands, LabelArgs};
use crate::cli::output;
use crate::cli::render::{LogicalStructure, PhysicalStructure, TreeNodeConvert};
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{
    editor, Division, InsertionPosition, LogicalId, PaginationScope, Paginator, Physical, PhysicalId,
    View, Workpiece,
};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;
use crate::infrastructure::traits::Ruleset;

/// Run the parsed command line.
pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see --help".to_string(),
        ));
    };
    if let Commands::Completion { shell } = command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let settings = Settings::load(cli.store_dir.as_deref())?;
    debug!(store_dir = %settings.store_dir.display(), "settings loaded");
    if let Commands::Config { command } = command {
        return config_command(command, &settings);
    }
    let container = ServiceContainer::new(settings)?;

    match command {
        Commands::New { id, kind } => new_workpiece(&container, id, kind),
        Commands::Show {
            id,
            physical,
            logical,
        } => show(&container, id, !*physical, !*logical),
        Commands::Insert {
            id,
            kind,
            at,
            position,
            pages,
            label,
            physical,
            count,
            metadata,
            first,
        } => {
            if *physical {
                insert_physical(&container, id, kind, at, *position, label.as_deref())
            } else if let (Some(count), Some(key)) = (count, metadata) {
                insert_many(&container, id, kind, at, *position, *count, key, first)
            } else {
                insert(&container, id, kind, at, *position, pages, label.as_deref())
            }
        }
        Commands::AddPage { id, count } => {
            let created = container.pagination().add_dummy_pages(id, *count)?;
            output::success(&format!("added {} page(s) to {}", created, id));
            Ok(())
        }
        Commands::Remove { id, at, physical } => remove(&container, id, at, *physical),
        Commands::Move {
            id,
            from,
            to,
            position,
        } => move_division(&container, id, from, to, *position),
        Commands::Link { parent, child, at } => link(&container, parent, child, at.as_deref()),
        Commands::Unlink { parent, child } => {
            container.links().remove_link(parent, child)?;
            output::success(&format!("unlinked {} from {}", child, parent));
            Ok(())
        }
        Commands::CreatePagination { id } => {
            let created = container.pagination().create_pagination(id)?;
            output::success(&format!("{}: {} new page(s) from media", id, created));
            Ok(())
        }
        Commands::Paginate {
            id,
            pages,
            labels,
            selected_only,
        } => {
            let selection = zero_based(pages)?;
            let scope = if *selected_only {
                PaginationScope::SelectedOnly
            } else {
                PaginationScope::FromFirstSelected
            };
            let paginator = paginator(labels, &container.settings)?;
            let count = container
                .pagination()
                .paginate(id, &selection, scope, paginator)?;
            output::success(&format!("relabelled {} page(s)", count));
            Ok(())
        }
        Commands::Renumber { id, labels } => {
            let paginator = paginator(labels, &container.settings)?;
            let count = container.pagination().renumber(id, paginator)?;
            output::success(&format!("renumbered {} page(s)", count));
            Ok(())
        }
        Commands::Explode { ids } => explode(&container, ids),
        Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
    }
}

/// Parses a node address; `""` and `"/"` address the root.
pub fn parse_node_path(address: &str) -> CliResult<Vec<usize>> {
    let trimmed = address.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return Ok(Vec::new());
    }
    parse_insertion_position(trimmed).map_err(|e| CliError::InvalidArgs(e.to_string()))
}

fn logical_at(workpiece: &Workpiece, address: &str) -> CliResult<LogicalId> {
    let path = parse_node_path(address)?;
    workpiece
        .logical()
        .resolve_path(&path)
        .ok_or_else(|| CliError::InvalidArgs(format!("no logical division at '{}'", address)))
}

fn physical_at(workpiece: &Workpiece, address: &str) -> CliResult<PhysicalId> {
    let path = parse_node_path(address)?;
    workpiece
        .physical()
        .resolve_path(&path)
        .ok_or_else(|| CliError::InvalidArgs(format!("no physical division at '{}'", address)))
}

/// 1-based page numbers to 0-based positions.
fn zero_based(pages: &[usize]) -> CliResult<Vec<usize>> {
    pages
        .iter()
        .map(|&page| {
            page.checked_sub(1)
                .ok_or_else(|| CliError::InvalidArgs("pages are numbered from 1".to_string()))
        })
        .collect()
}

fn paginator(labels: &LabelArgs, settings: &Settings) -> CliResult<Paginator> {
    let separator = labels
        .separator
        .clone()
        .unwrap_or_else(|| settings.pagination.separator.clone());
    Ok(Paginator::new(labels.kind, labels.mode, &labels.start)?
        .fictitious(labels.fictitious)
        .separator(separator))
}

/// Kind of the division that will contain a new division inserted at `position`.
fn parent_kind(workpiece: &Workpiece, reference: LogicalId, position: InsertionPosition) -> Option<String> {
    let tree = workpiece.logical();
    let parent = match position {
        InsertionPosition::FirstChildOfCurrent | InsertionPosition::LastChildOfCurrent => {
            Some(reference)
        }
        _ => tree.parent(reference),
    }?;
    tree.get(parent).map(|division| division.kind.clone())
}

fn warn_child(ruleset: &dyn Ruleset, parent: Option<&str>, kind: &str) {
    if let Some(parent) = parent {
        if !ruleset.permits_child(parent, kind) {
            output::warning(&format!(
                "ruleset does not allow '{}' inside '{}'",
                kind, parent
            ));
        }
    }
}

#[instrument(skip(container))]
fn new_workpiece(container: &ServiceContainer, id: &str, kind: &str) -> CliResult<()> {
    let session = container.sessions().create(id, kind)?;
    session.save()?;
    session.close()?;
    output::success(&format!("created {} ({})", id, kind));
    Ok(())
}

#[instrument(skip(container))]
fn show(container: &ServiceContainer, id: &str, logical: bool, physical: bool) -> CliResult<()> {
    if !container.store.exists(id) {
        return Err(ApplicationError::WorkpieceNotFound(id.to_string()).into());
    }
    let workpiece = container
        .store
        .load(id)
        .map_err(|e| InfraError::io(format!("load workpiece {}", id), e))?;
    output::header(&format!("{} (created {})", workpiece.id(), workpiece.creation_date()));
    if logical {
        output::info(&LogicalStructure(&workpiece).to_tree_string());
    }
    if physical {
        output::info(&PhysicalStructure(&workpiece).to_tree_string());
    }
    Ok(())
}

#[instrument(skip(container))]
fn insert(
    container: &ServiceContainer,
    id: &str,
    kind: &str,
    at: &str,
    position: InsertionPosition,
    pages: &[usize],
    label: Option<&str>,
) -> CliResult<()> {
    let mut session = container.sessions().open(id)?;
    let reference = logical_at(session.workpiece(), at)?;
    let ordered = editor::collect_all_physical_sorted_by_order(
        session.workpiece(),
        &container.settings.pagination.page_type,
    );
    let views = zero_based(pages)?
        .into_iter()
        .map(|index| {
            ordered.get(index).map(|&page| View::on(page)).ok_or_else(|| {
                CliError::InvalidArgs(format!(
                    "page {} selected but only {} pages exist",
                    index + 1,
                    ordered.len()
                ))
            })
        })
        .collect::<CliResult<Vec<View>>>()?;
    warn_child(
        container.ruleset.as_ref(),
        parent_kind(session.workpiece(), reference, position).as_deref(),
        kind,
    );

    let created = editor::insert_structure(kind, session.workpiece_mut(), reference, position, &views)?;
    if let Some(division) = session.workpiece_mut().logical_division_mut(created) {
        division.label = label.map(str::to_string);
    }
    let address = session.workpiece().logical().path_of(created)?;
    session.save()?;
    session.close()?;
    output::success(&format!(
        "inserted {} at [{}] with {} page(s)",
        kind,
        address.iter().map(usize::to_string).collect::<Vec<_>>().join(","),
        views.len()
    ));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip(container))]
fn insert_many(
    container: &ServiceContainer,
    id: &str,
    kind: &str,
    at: &str,
    position: InsertionPosition,
    count: usize,
    key: &str,
    first: &str,
) -> CliResult<()> {
    let mut session = container.sessions().open(id)?;
    let reference = logical_at(session.workpiece(), at)?;
    warn_child(
        container.ruleset.as_ref(),
        parent_kind(session.workpiece(), reference, position).as_deref(),
        kind,
    );
    if !container.ruleset.permits_metadata(kind, key) {
        output::warning(&format!("ruleset does not allow '{}' on '{}'", key, kind));
    }
    let created = editor::add_multiple_structures(
        count,
        kind,
        session.workpiece_mut(),
        reference,
        position,
        key,
        first,
    )?;
    session.save()?;
    session.close()?;
    output::success(&format!("inserted {} {} division(s)", created.len(), kind));
    Ok(())
}

#[instrument(skip(container))]
fn insert_physical(
    container: &ServiceContainer,
    id: &str,
    kind: &str,
    at: &str,
    position: InsertionPosition,
    label: Option<&str>,
) -> CliResult<()> {
    let mut session = container.sessions().open(id)?;
    let reference = physical_at(session.workpiece(), at)?;
    let mut division = Division::<Physical>::new(kind);
    division.label = label.map(str::to_string);
    editor::insert_physical_division(division, session.workpiece_mut(), reference, position)?;
    session.save()?;
    session.close()?;
    output::success(&format!("inserted physical {}", kind));
    Ok(())
}

#[instrument(skip(container))]
fn remove(container: &ServiceContainer, id: &str, at: &str, physical: bool) -> CliResult<()> {
    let mut session = container.sessions().open(id)?;
    if physical {
        let node = physical_at(session.workpiece(), at)?;
        let affected = editor::remove_physical(session.workpiece_mut(), node)?;
        output::success(&format!(
            "removed physical division, {} logical division(s) lost views",
            affected.len()
        ));
    } else {
        let node = logical_at(session.workpiece(), at)?;
        let removed = editor::remove_structure(session.workpiece_mut(), node)?;
        output::success(&format!("removed {}", removed));
    }
    session.save()?;
    session.close()?;
    Ok(())
}

#[instrument(skip(container))]
fn move_division(
    container: &ServiceContainer,
    id: &str,
    from: &str,
    to: &str,
    position: InsertionPosition,
) -> CliResult<()> {
    let mut session = container.sessions().open(id)?;
    let node = logical_at(session.workpiece(), from)?;
    let target = logical_at(session.workpiece(), to)?;
    if let Some(kind) = session.workpiece().logical_division(node).map(|d| d.kind.clone()) {
        warn_child(
            container.ruleset.as_ref(),
            parent_kind(session.workpiece(), target, position).as_deref(),
            &kind,
        );
    }
    editor::move_structure(session.workpiece_mut(), node, target, position)?;
    session.save()?;
    session.close()?;
    output::success(&format!("moved [{}] {} [{}]", from, position, to));
    Ok(())
}

#[instrument(skip(container))]
fn link(container: &ServiceContainer, parent: &str, child: &str, at: Option<&str>) -> CliResult<()> {
    let position = match at {
        Some(position) => position.to_string(),
        None => {
            let workpiece = container.store.load(parent).map_err(|e| {
                InfraError::io(format!("load workpiece {}", parent), e)
            })?;
            workpiece
                .logical()
                .child_count(workpiece.logical_root())
                .to_string()
        }
    };
    container.links().add_link(parent, &position, child)?;
    output::success(&format!("linked {} into {} at [{}]", child, parent, position));
    Ok(())
}

#[instrument(skip(container))]
fn explode(container: &ServiceContainer, ids: &[String]) -> CliResult<()> {
    let service = container.explode();
    let mut failed = None;
    for (id, result) in service.explode_all(ids) {
        match result {
            Ok(outcome) => {
                output::action("exploded", &id);
                output::detail(&format!("original kept as {}", outcome.original_id));
                for child in &outcome.child_ids {
                    output::success_detail(child);
                }
                if outcome.dropped_views > 0 {
                    output::warning(&format!(
                        "{} view(s) onto pages of an earlier child were dropped",
                        outcome.dropped_views
                    ));
                }
            }
            Err(e) => {
                output::failure(&format!("{}: {}", id, e));
                failed.get_or_insert(e);
            }
        }
    }
    match failed {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn config_command(command: &ConfigCommands, settings: &Settings) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            output::info(&settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::detail(&format!("global: {}", path.display())),
                None => output::detail("global: (no config directory)"),
            }
            output::detail(&format!(
                "local:  {}",
                local_config_path(&settings.store_dir).display()
            ));
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path()
                    .ok_or_else(|| CliError::Usage("no global config directory".to_string()))?
            } else {
                local_config_path(&settings.store_dir)
            };
            if path.exists() {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            let write = |path: &std::path::Path| -> io::Result<()> {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, Settings::template())
            };
            write(&path).map_err(|e| {
                InfraError::io(format!("write {}", path.display()), e)
            })?;
            output::action("created", &path.display());
            Ok(())
        }
    }
}
