use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chat_backend::{Chat, ChatId, ChatSource};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::CatalogError;
use crate::paths::{catalog_path, temp_path_for};
use crate::schema::{CatalogFile, ChatPatch, Project, Template, CATALOG_VERSION};

/// Persisted local catalog of chats and the projects/templates they were
/// started from.
#[derive(Debug)]
pub struct CatalogStore {
    path: PathBuf,
    catalog: CatalogFile,
}

impl CatalogStore {
    /// Opens the catalog at `path`; a missing file yields an empty catalog.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let path = path.to_path_buf();
        let catalog = match fs::read_to_string(&path) {
            Ok(text) => parse_catalog(&path, &text)?,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "catalog file missing; starting empty");
                CatalogFile::default()
            }
            Err(source) => return Err(CatalogError::io("reading catalog file", &path, source)),
        };

        Ok(Self { path, catalog })
    }

    /// Opens `<root>/.agent-chat/catalog.json`.
    pub fn open_in(root: &Path) -> Result<Self, CatalogError> {
        Self::open(&catalog_path(root))
    }

    /// Writes the catalog as pretty JSON through a temp file and a rename.
    pub fn save(&self) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| CatalogError::io("creating catalog directory", parent, source))?;
        }

        let mut text = serde_json::to_string_pretty(&self.catalog)
            .map_err(|source| CatalogError::json_serialize(&self.path, source))?;
        text.push('\n');

        let temp_path = temp_path_for(&self.path);
        fs::write(&temp_path, text)
            .map_err(|source| CatalogError::io("writing catalog temp file", &temp_path, source))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|source| CatalogError::io("replacing catalog file", &self.path, source))?;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogFile {
        &self.catalog
    }

    #[must_use]
    pub fn chats(&self) -> &[Chat] {
        &self.catalog.chats
    }

    #[must_use]
    pub fn chat(&self, id: ChatId) -> Option<&Chat> {
        self.catalog.chats.iter().find(|chat| chat.id == id)
    }

    pub fn set_chats(&mut self, chats: Vec<Chat>) {
        self.catalog.chats = chats;
    }

    /// Replaces the chat with the same id, or puts a new chat first.
    pub fn upsert_chat(&mut self, chat: Chat) {
        match self.catalog.chats.iter_mut().find(|known| known.id == chat.id) {
            Some(known) => *known = chat,
            None => self.catalog.chats.insert(0, chat),
        }
    }

    /// Applies `patch` to a known chat and stamps its `updated` time.
    pub fn update_chat(&mut self, id: ChatId, patch: ChatPatch) -> Result<&Chat, CatalogError> {
        let updated = now_rfc3339()?;
        let Some(chat) = self.catalog.chats.iter_mut().find(|chat| chat.id == id) else {
            return Err(CatalogError::UnknownChat {
                path: self.path.clone(),
                id,
            });
        };

        if let Some(name) = patch.name {
            chat.name = name;
        }
        if let Some(status) = patch.status {
            chat.status = Some(status);
        }
        chat.updated = Some(updated);
        Ok(chat)
    }

    pub fn delete_chat(&mut self, id: ChatId) -> Option<Chat> {
        let index = self.catalog.chats.iter().position(|chat| chat.id == id)?;
        Some(self.catalog.chats.remove(index))
    }

    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.catalog.projects
    }

    #[must_use]
    pub fn project(&self, id: i64) -> Option<&Project> {
        self.catalog.projects.iter().find(|project| project.id == id)
    }

    pub fn set_projects(&mut self, projects: Vec<Project>) {
        self.catalog.projects = projects;
    }

    pub fn upsert_project(&mut self, project: Project) {
        match self
            .catalog
            .projects
            .iter_mut()
            .find(|known| known.id == project.id)
        {
            Some(known) => *known = project,
            None => self.catalog.projects.push(project),
        }
    }

    pub fn delete_project(&mut self, id: i64) -> Option<Project> {
        let index = self
            .catalog
            .projects
            .iter()
            .position(|project| project.id == id)?;
        Some(self.catalog.projects.remove(index))
    }

    #[must_use]
    pub fn templates(&self) -> &[Template] {
        &self.catalog.templates
    }

    #[must_use]
    pub fn template(&self, id: i64) -> Option<&Template> {
        self.catalog
            .templates
            .iter()
            .find(|template| template.id == id)
    }

    pub fn set_templates(&mut self, templates: Vec<Template>) {
        self.catalog.templates = templates;
    }

    pub fn upsert_template(&mut self, template: Template) {
        match self
            .catalog
            .templates
            .iter_mut()
            .find(|known| known.id == template.id)
        {
            Some(known) => *known = template,
            None => self.catalog.templates.push(template),
        }
    }

    pub fn delete_template(&mut self, id: i64) -> Option<Template> {
        let index = self
            .catalog
            .templates
            .iter()
            .position(|template| template.id == id)?;
        Some(self.catalog.templates.remove(index))
    }

    /// The project a chat runs: its own project, or the template's embedded
    /// project for template-born chats.
    #[must_use]
    pub fn chat_source_project(&self, chat: &Chat) -> Option<&Project> {
        match chat.source {
            ChatSource::Project(id) => self.project(id),
            ChatSource::Template(id) => self.template(id).map(|template| &template.project),
        }
    }

    /// Display name for a chat about to be created from `source`.
    #[must_use]
    pub fn initial_chat_name(&self, source: ChatSource) -> String {
        let name = match source {
            ChatSource::Project(id) => self.project(id).map(|project| project.name.as_str()),
            ChatSource::Template(id) => self.template(id).map(|template| template.name.as_str()),
        };
        format!("Chat for {}", name.unwrap_or_default())
    }

    #[must_use]
    pub fn sample_messages(&self, id: ChatId) -> Vec<String> {
        self.chat(id)
            .and_then(|chat| self.chat_source_project(chat))
            .map(|project| project.flow.sample_messages())
            .unwrap_or_default()
    }
}

fn parse_catalog(path: &Path, text: &str) -> Result<CatalogFile, CatalogError> {
    let catalog = serde_json::from_str::<CatalogFile>(text)
        .map_err(|source| CatalogError::json_parse(path, source))?;
    if catalog.version != CATALOG_VERSION {
        return Err(CatalogError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: catalog.version,
        });
    }
    Ok(catalog)
}

fn now_rfc3339() -> Result<String, CatalogError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(CatalogError::ClockFormat)
}
