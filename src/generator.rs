use std::sync::{Arc, OnceLock};

use crate::aggregate::aggregate;
use crate::configuration::GeneratorConfiguration;
use crate::error::{ContextError, GenerationError};
use crate::layout::{select_layout, DocumentType};
use crate::pdf::Font;
use crate::project::Project;
use crate::render::{render, RenderedDocument};

static GLOBAL_GENERATOR: OnceLock<DocumentGenerator> = OnceLock::new();

/// Turns project snapshots into documents.
///
/// The generator owns the configuration and the font, both loaded once and never mutated
/// afterwards, so a single instance can serve any number of threads at the same time.
#[derive(Debug, Clone)]
pub struct DocumentGenerator {
    configuration: GeneratorConfiguration,
    font: Arc<Font>,
}

impl DocumentGenerator {
    /// Validates the configuration and loads the font it points to.
    pub fn new(configuration: GeneratorConfiguration) -> Result<Self, ContextError> {
        configuration.validate()?;
        let font = Font::from_path(&configuration.font_file_path)?;
        log::info!(
            "Loaded the font {:?} for the document generator",
            configuration.font_file_path
        );

        Ok(DocumentGenerator::from_parts(configuration, Arc::new(font)))
    }

    /// Builds a generator around an already loaded font.
    pub fn from_parts(configuration: GeneratorConfiguration, font: Arc<Font>) -> Self {
        DocumentGenerator {
            configuration,
            font,
        }
    }

    pub fn configuration(&self) -> &GeneratorConfiguration {
        &self.configuration
    }

    pub fn font(&self) -> &Arc<Font> {
        &self.font
    }

    /// Makes the generator available to the whole process through [`DocumentGenerator::global`].
    /// Only the first installation succeeds, the generator is handed back otherwise.
    pub fn install_global(generator: DocumentGenerator) -> Result<(), DocumentGenerator> {
        GLOBAL_GENERATOR.set(generator)
    }

    /// The generator installed with [`DocumentGenerator::install_global`], if any.
    pub fn global() -> Option<&'static DocumentGenerator> {
        GLOBAL_GENERATOR.get()
    }

    /// Validates the project, computes its totals and renders it as the given type of document.
    ///
    /// Nothing is rendered when a detail line is invalid: the error names the line and the field.
    pub fn generate(
        &self,
        project: &Project,
        document_type: DocumentType,
    ) -> Result<RenderedDocument, GenerationError> {
        log::debug!(
            "Generating the {} of the project {} ({} details)",
            document_type.label(),
            project.id,
            project.details.len()
        );
        let aggregate = aggregate(&project.details, document_type, &self.configuration)
            .map_err(|error| {
                log::warn!("Rejected the project {}: {}", project.id, error);
                error
            })?;
        let layout = select_layout(document_type);
        let rendered_document =
            render(project, &aggregate, &layout, &self.font, &self.configuration)?;
        log::info!(
            "Generated {} for the project {}",
            rendered_document.file_name,
            project.id
        );

        Ok(rendered_document)
    }

    /// Like [`DocumentGenerator::generate`], with the document type given by its name.
    pub fn generate_by_name(
        &self,
        project: &Project,
        document_type_name: &str,
    ) -> Result<RenderedDocument, GenerationError> {
        let document_type = document_type_name.parse::<DocumentType>()?;
        self.generate(project, document_type)
    }

    pub fn generate_invoice(&self, project: &Project) -> Result<RenderedDocument, GenerationError> {
        self.generate(project, DocumentType::Invoice)
    }

    pub fn generate_delivery_note(
        &self,
        project: &Project,
    ) -> Result<RenderedDocument, GenerationError> {
        self.generate(project, DocumentType::DeliveryNote)
    }

    pub fn generate_quotation(
        &self,
        project: &Project,
    ) -> Result<RenderedDocument, GenerationError> {
        self.generate(project, DocumentType::Quotation)
    }
}
