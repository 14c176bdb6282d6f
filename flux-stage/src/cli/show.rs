use clap::{Args, ValueEnum};

use super::common::ReleaseArgs;
use crate::{context::DeploymentContext, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub release: ReleaseArgs,

    #[arg(long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

#[derive(serde::Serialize)]
struct ContextReport<'a> {
    #[serde(flatten)]
    context: &'a DeploymentContext,
    manifest_path: String,
}

pub fn show(args: ShowArgs) -> Result<()> {
    let context = args.release.context()?;

    match args.output {
        OutputFormat::Table => println!("{}", table(&context)),
        OutputFormat::Json => println!("{}", json(&context)?),
    }

    Ok(())
}

fn table(context: &DeploymentContext) -> comfy_table::Table {
    use comfy_table::{Attribute, Cell, ContentArrangement, Table};

    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["field", "value"]
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        );

    for (field, value) in context.fields() {
        table.add_row([field.to_owned(), value]);
    }
    table.add_row(["manifest path".to_owned(), context.manifest_repo_path()]);

    table
}

fn json(context: &DeploymentContext) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ContextReport {
        context,
        manifest_path: context.manifest_repo_path(),
    })?)
}
