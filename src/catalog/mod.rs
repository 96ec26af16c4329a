use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use glob::glob;
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::{QueryDescriptor, ANCHOR_QUERY_NAME, LEFTMOST_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::validation::{is_reserved_keyword, validate_identifier};

static DIALECT_TAG: LazyLock<Regex> = LazyLock::new(|| header_tag("DIALECT"));
static ENTITY_TAG: LazyLock<Regex> = LazyLock::new(|| header_tag("ENTITY"));
static DOMAIN_TAG: LazyLock<Regex> = LazyLock::new(|| header_tag("DOMAIN"));

fn header_tag(tag: &str) -> Regex {
    Regex::new(&format!(r"(?m)^--\s*{}:\s*(.+?)\s*$", tag)).expect("header tag pattern is valid")
}

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub name: String,
    pub content: String,
    pub path: PathBuf,
}

pub struct FileLoader;

impl FileLoader {
    pub fn load_dir(path: impl AsRef<Path>, extension: &str) -> Result<Vec<LoadedFile>> {
        let root = path.as_ref();
        if !root.is_dir() {
            return Err(Error::Catalog(format!(
                "Catalog path is not a directory: {}",
                root.display()
            )));
        }

        let pattern = root.join(format!("**/*.{}", extension));
        let pattern_str = pattern.to_string_lossy();

        let files: Vec<PathBuf> = glob(&pattern_str)
            .map_err(|e| Error::Catalog(format!("Invalid glob pattern: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        files
            .into_iter()
            .map(|file_path| Self::load_file(&file_path))
            .collect()
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<LoadedFile> {
        let path = path.as_ref();

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Catalog(format!("Invalid filename: {}", path.display())))?
            .to_string();

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Catalog(format!("Failed to read {}: {}", path.display(), e)))?;

        Ok(LoadedFile {
            name,
            content,
            path: path.to_path_buf(),
        })
    }
}

/// Which catalog queries a run should execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySelection {
    Domains(Vec<String>),
    Queries(Vec<String>),
    All,
}

impl QuerySelection {
    /// Explicit query names win over domains when both are given.
    pub fn from_parts(domains: Option<Vec<String>>, queries: Option<Vec<String>>) -> Self {
        match (domains, queries) {
            (Some(_), Some(queries)) => {
                warn!("domains will be ignored since queries were specified");
                QuerySelection::Queries(queries)
            }
            (None, Some(queries)) => QuerySelection::Queries(queries),
            (Some(domains), None) => QuerySelection::Domains(domains),
            (None, None) => QuerySelection::All,
        }
    }
}

/// In-memory index of tagged feature queries, built once per load.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<QueryDescriptor>,
}

impl Catalog {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let descriptors = FileLoader::load_dir(dir, "sql")?
            .into_iter()
            .map(parse_descriptor)
            .collect::<Result<Vec<_>>>()?;
        debug!(dir = %dir.display(), queries = descriptors.len(), "Catalog loaded");
        Self::from_descriptors(descriptors)
    }

    pub fn from_descriptors(entries: Vec<QueryDescriptor>) -> Result<Self> {
        for (i, entry) in entries.iter().enumerate() {
            validate_identifier("query name", &entry.name)
                .map_err(|_| Error::Catalog(format!("Invalid query name: {}", entry.name)))?;
            if entry.name == ANCHOR_QUERY_NAME {
                return Err(Error::Catalog(format!(
                    "Query name {} is reserved for the staged table: {}",
                    ANCHOR_QUERY_NAME,
                    entry.path.display()
                )));
            }
            if is_reserved_keyword(&entry.name) {
                return Err(Error::Catalog(format!(
                    "Query name {} is a reserved SQL keyword: {}",
                    entry.name,
                    entry.path.display()
                )));
            }
            let duplicate = entries[..i].iter().find(|other| {
                other.dialect == entry.dialect
                    && other.entity == entry.entity
                    && other.name == entry.name
            });
            if let Some(other) = duplicate {
                return Err(Error::Catalog(format!(
                    "Duplicate query {} for {}/{}: {} and {}",
                    entry.name,
                    entry.dialect,
                    entry.entity,
                    other.path.display(),
                    entry.path.display()
                )));
            }
            if !entry.sql.contains(LEFTMOST_PLACEHOLDER) {
                warn!(query = %entry.name, "Query does not reference {}", LEFTMOST_PLACEHOLDER);
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list_dialects(&self) -> Vec<String> {
        distinct(self.entries.iter().map(|e| &e.dialect))
    }

    pub fn list_entities(&self, dialect: &str) -> Result<Vec<String>> {
        self.check_dialect(dialect)?;
        Ok(distinct(
            self.entries
                .iter()
                .filter(|e| e.dialect == dialect)
                .map(|e| &e.entity),
        ))
    }

    pub fn list_domains(&self, dialect: &str, entity: &str) -> Result<Vec<String>> {
        self.check_entity(dialect, entity)?;
        Ok(distinct(self.scoped(dialect, entity).map(|e| &e.domain)))
    }

    pub fn list_queries(
        &self,
        dialect: &str,
        entity: &str,
        domains: Option<&[String]>,
    ) -> Result<Vec<String>> {
        self.check_entity(dialect, entity)?;
        if let Some(domains) = domains {
            self.check_domains(dialect, entity, domains)?;
        }
        Ok(distinct(
            self.scoped(dialect, entity)
                .filter(|e| domains.map_or(true, |d| d.contains(&e.domain)))
                .map(|e| &e.name),
        ))
    }

    pub fn queries_from_domains(
        &self,
        dialect: &str,
        entity: &str,
        domains: &[String],
    ) -> Result<BTreeMap<String, QueryDescriptor>> {
        self.check_entity(dialect, entity)?;
        self.check_domains(dialect, entity, domains)?;
        Ok(self
            .scoped(dialect, entity)
            .filter(|e| domains.contains(&e.domain))
            .map(|e| (e.name.clone(), e.clone()))
            .collect())
    }

    pub fn queries_by_name(
        &self,
        dialect: &str,
        entity: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, QueryDescriptor>> {
        self.check_entity(dialect, entity)?;
        let selected: BTreeMap<String, QueryDescriptor> = self
            .scoped(dialect, entity)
            .filter(|e| names.contains(&e.name))
            .map(|e| (e.name.clone(), e.clone()))
            .collect();
        if let Some(missing) = names.iter().find(|n| !selected.contains_key(n.as_str())) {
            return Err(Error::Config(format!("Invalid query: {}", missing)));
        }
        Ok(selected)
    }

    pub fn resolve(
        &self,
        dialect: &str,
        entity: &str,
        selection: &QuerySelection,
    ) -> Result<BTreeMap<String, QueryDescriptor>> {
        match selection {
            QuerySelection::Queries(names) => self.queries_by_name(dialect, entity, names),
            QuerySelection::Domains(domains) => self.queries_from_domains(dialect, entity, domains),
            QuerySelection::All => {
                self.check_entity(dialect, entity)?;
                Ok(self
                    .scoped(dialect, entity)
                    .map(|e| (e.name.clone(), e.clone()))
                    .collect())
            }
        }
    }

    fn scoped<'a>(
        &'a self,
        dialect: &'a str,
        entity: &'a str,
    ) -> impl Iterator<Item = &'a QueryDescriptor> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.dialect == dialect && e.entity == entity)
    }

    fn check_dialect(&self, dialect: &str) -> Result<()> {
        if !self.entries.iter().any(|e| e.dialect == dialect) {
            return Err(Error::Config(format!("Invalid dialect: {}", dialect)));
        }
        Ok(())
    }

    fn check_entity(&self, dialect: &str, entity: &str) -> Result<()> {
        self.check_dialect(dialect)?;
        if self.scoped(dialect, entity).next().is_none() {
            return Err(Error::Config(format!("Invalid entity_id: {}", entity)));
        }
        Ok(())
    }

    fn check_domains(&self, dialect: &str, entity: &str, domains: &[String]) -> Result<()> {
        for domain in domains {
            if !self.scoped(dialect, entity).any(|e| &e.domain == domain) {
                return Err(Error::Config(format!("Invalid domain: {}", domain)));
            }
        }
        Ok(())
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

pub fn parse_descriptor(file: LoadedFile) -> Result<QueryDescriptor> {
    let tag = |re: &Regex, label: &str| -> Result<String> {
        re.captures(&file.content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                Error::Catalog(format!(
                    "Missing -- {}: header in {}",
                    label,
                    file.path.display()
                ))
            })
    };

    Ok(QueryDescriptor {
        dialect: tag(&DIALECT_TAG, "DIALECT")?,
        entity: tag(&ENTITY_TAG, "ENTITY")?,
        domain: tag(&DOMAIN_TAG, "DOMAIN")?,
        name: file.name,
        sql: file.content,
        path: file.path,
    })
}

/// Writes the raw body of every selected query to `<export_dir>/<name>.sql`.
pub fn freeze_queries(
    export_dir: impl AsRef<Path>,
    queries: &BTreeMap<String, QueryDescriptor>,
) -> Result<Vec<PathBuf>> {
    let export_dir = export_dir.as_ref();
    fs::create_dir_all(export_dir)?;

    let mut written = Vec::with_capacity(queries.len());
    for (name, descriptor) in queries {
        let target = export_dir.join(format!("{}.sql", name));
        fs::write(&target, &descriptor.sql)?;
        written.push(target);
    }
    debug!(dir = %export_dir.display(), count = written.len(), "Queries frozen");
    Ok(written)
}
