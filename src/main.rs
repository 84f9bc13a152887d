#![warn(clippy::unwrap_used)]

use std::path::PathBuf;

use clap::Parser;
use jobdocs::{ContextError, DocumentGenerator, DocumentType, GeneratorConfiguration, Project};

#[derive(Parser, Debug)]
#[command(version, about = "Generates the invoice, delivery note or quotation of a project", long_about = None)]
struct CliArguments {
    #[arg(short = 'p', long = "project", value_name = "json_file")]
    project_path: PathBuf,
    #[arg(short = 'c', long = "configuration", value_name = "json_file")]
    configuration_path: PathBuf,
    /// One of "invoice", "delivery-note" or "quotation"
    #[arg(short = 't', long = "document-type", value_name = "name")]
    document_type: String,
    /// The output file, or directory in which the document is saved under its own file name
    #[arg(short = 'o', long = "output", value_name = "path")]
    output_path: PathBuf,
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

fn fallible_main() -> Result<(), ContextError> {
    let arguments = CliArguments::parse();
    env_logger::builder()
        .filter_level(if arguments.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();
    log::debug!("{:?}", arguments);

    let document_type = arguments
        .document_type
        .parse::<DocumentType>()
        .map_err(|error| ContextError::with_error("Invalid document type", &error))?;
    let configuration = GeneratorConfiguration::from_path(&arguments.configuration_path)?;
    let project = Project::from_path(&arguments.project_path)?;
    let generator = DocumentGenerator::new(configuration)?;

    let rendered_document = generator
        .generate(&project, document_type)
        .map_err(|error| ContextError::with_error("Failed to generate the document", &error))?;
    let output_file_path = if arguments.output_path.is_dir() {
        arguments.output_path.join(&rendered_document.file_name)
    } else {
        arguments.output_path.clone()
    };
    std::fs::write(&output_file_path, &rendered_document.bytes)
        .map_err(|error| ContextError::with_error("Failed to save the output file", &error))?;
    log::info!(
        "Saved the {} ({} pages) to the path: {:?}",
        document_type.label(),
        rendered_document.page_count,
        output_file_path
    );

    Ok(())
}
