use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use dash_core::{DashError, DefinitionLoader, QueryDefinition, YamlDefinitionLoader};
use std::path::Path;
use std::sync::Arc;

/// Outcome of loading one definition file
pub struct CheckedDefinition {
    pub id: String,
    pub definition: Result<Arc<QueryDefinition>, DashError>,
}

impl CheckedDefinition {
    pub fn is_ok(&self) -> bool {
        self.definition.is_ok()
    }
}

/// Load every definition in `dir`.
pub fn check_definitions(dir: &Path) -> Result<Vec<CheckedDefinition>> {
    let loader = YamlDefinitionLoader::new(dir);
    let checked = loader
        .list_ids()?
        .into_iter()
        .map(|id| {
            let definition = loader.load(&id);
            CheckedDefinition { id, definition }
        })
        .collect();
    Ok(checked)
}

pub fn check(dir: &Path) -> Result<()> {
    println!(
        "{} Checking query definitions in {}",
        "→".bright_blue(),
        dir.display().to_string().bright_cyan()
    );

    let checked = check_definitions(dir)?;
    tracing::debug!(dir = %dir.display(), count = checked.len(), "loaded definitions");
    if checked.is_empty() {
        println!("{}", "No query definitions found".bright_yellow());
        return Ok(());
    }

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Query").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Yellow),
        Cell::new("Params").fg(Color::Green),
        Cell::new("Status").fg(Color::Magenta),
    ]);

    for entry in &checked {
        match &entry.definition {
            Ok(definition) => {
                let undeclared = definition.undeclared_placeholders();
                let status = if undeclared.is_empty() {
                    Cell::new("ok").fg(Color::Green)
                } else {
                    Cell::new(format!("undeclared: {}", undeclared.join(", ")))
                        .fg(Color::Yellow)
                };
                table.add_row(vec![
                    Cell::new(&entry.id),
                    Cell::new(&definition.name),
                    Cell::new(definition.parameters.len()),
                    status,
                ]);
            }
            Err(err) => {
                table.add_row(vec![
                    Cell::new(&entry.id),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(err.to_string()).fg(Color::Red),
                ]);
            }
        }
    }
    println!("{}", table);

    let failed = checked.iter().filter(|c| !c.is_ok()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} definitions failed to load", failed, checked.len());
    }

    println!(
        "{} {} definitions loaded",
        "✓".bright_green(),
        checked.len()
    );
    Ok(())
}

pub fn show(dir: &Path, query_id: &str) -> Result<()> {
    let loader = YamlDefinitionLoader::new(dir);
    let definition = loader.load(query_id)?;

    println!("{} {}", "Query:".bright_yellow().bold(), definition.id);
    println!("{} {}", "Name:".bright_yellow().bold(), definition.name);
    if !definition.description.is_empty() {
        println!(
            "{} {}",
            "Description:".bright_yellow().bold(),
            definition.description
        );
    }

    if definition.is_parameterized() {
        let mut table = ComfyTable::new();
        table.set_header(vec![
            Cell::new("Parameter").fg(Color::Cyan),
            Cell::new("Type").fg(Color::Yellow),
            Cell::new("Array").fg(Color::Green),
        ]);
        for spec in &definition.parameters {
            table.add_row(vec![
                Cell::new(&spec.name),
                Cell::new(spec.param_type),
                Cell::new(if spec.array { "yes" } else { "no" }),
            ]);
        }
        println!("{}", table);
    } else {
        println!("{}", "No parameters".bright_black());
    }

    println!();
    println!("{}", definition.body.trim_end().bright_cyan());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_definitions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("daily.yml"),
            "name: Daily\nbody: SELECT 1\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "description: no body\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let checked = check_definitions(dir.path()).unwrap();
        let ids: Vec<_> = checked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["broken", "daily"]);
        assert!(!checked[0].is_ok());
        assert!(checked[1].is_ok());

        assert!(check(dir.path()).is_err());
    }

    #[test]
    fn test_show_missing_definition() {
        let dir = tempfile::tempdir().unwrap();
        assert!(show(dir.path(), "missing").is_err());
    }
}
