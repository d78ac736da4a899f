use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::schema::{
    BuyerType, MappedService, OfferAngle, OutreachTemplate, QueryCategory, QueryTemplate, Settings,
    TemplateType,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    /// Defaults for a Settings row created lazily for a new owner.
    pub settings: Settings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub database: PathBuf,
    pub owner: String,
    pub seed_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            database: PathBuf::from("leadradar.db"),
            owner: "local".to_string(),
            seed_dir: PathBuf::from("seed"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            settings: Settings::default(),
        }
    }
}

impl AppConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        validate_settings(&config.settings)?;
        Ok(config)
    }
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.fu2_delay_hours < settings.fu1_delay_hours {
        bail!(
            "fu2_delay_hours ({}) must not be less than fu1_delay_hours ({})",
            settings.fu2_delay_hours,
            settings.fu1_delay_hours
        );
    }
    if settings.query_max_runs_per_day == 0 {
        bail!("query_max_runs_per_day must be at least 1");
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySeed {
    pub id: Option<String>,
    pub name: String,
    pub category: QueryCategory,
    pub mapped_service: MappedService,
    pub base_query_text: String,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSeed {
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub template_type: TemplateType,
    pub body: String,
    #[serde(default)]
    pub applicable_buyer_type: BuyerType,
    #[serde(default)]
    pub applicable_service: MappedService,
    #[serde(default)]
    pub applicable_offer_angle: OfferAngle,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_engine() -> String {
    "bing".to_string()
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct QueriesFile {
    queries: Vec<QuerySeed>,
}

#[derive(Debug, Clone, Deserialize)]
struct TemplatesFile {
    templates: Vec<TemplateSeed>,
}

/// Default query and outreach templates shipped with the tool.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub queries: Vec<QuerySeed>,
    pub templates: Vec<TemplateSeed>,
}

impl Catalog {
    pub fn load_from_dir(path: &Path) -> Result<Self> {
        let queries_path = path.join("queries.yaml");
        let queries_str = fs::read_to_string(&queries_path)
            .with_context(|| format!("reading {}", queries_path.display()))?;
        let queries: QueriesFile = serde_yaml::from_str(&queries_str)
            .with_context(|| format!("parsing {}", queries_path.display()))?;

        let templates_path = path.join("templates.yaml");
        let templates_str = fs::read_to_string(&templates_path)
            .with_context(|| format!("reading {}", templates_path.display()))?;
        let templates: TemplatesFile = serde_yaml::from_str(&templates_str)
            .with_context(|| format!("parsing {}", templates_path.display()))?;

        Ok(Self {
            queries: queries.queries,
            templates: templates.templates,
        })
    }

    /// Seeds without an explicit id get a stable one so re-seeding updates
    /// rather than duplicates.
    pub fn query_templates(&self, owner: &str, now: OffsetDateTime) -> Vec<QueryTemplate> {
        self.queries
            .iter()
            .map(|seed| QueryTemplate {
                id: seed
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("seed-{}", seed.category)),
                owner: owner.to_string(),
                name: seed.name.clone(),
                engine: seed.engine.clone(),
                category: seed.category,
                mapped_service: seed.mapped_service,
                base_query_text: seed.base_query_text.clone(),
                is_active: seed.is_active,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }

    pub fn outreach_templates(&self, owner: &str, now: OffsetDateTime) -> Vec<OutreachTemplate> {
        self.templates
            .iter()
            .map(|seed| OutreachTemplate {
                id: seed
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("seed-{}-{}", seed.template_type, seed.priority)),
                owner: owner.to_string(),
                name: seed.name.clone(),
                template_type: seed.template_type,
                body: seed.body.clone(),
                applicable_buyer_type: seed.applicable_buyer_type,
                applicable_service: seed.applicable_service,
                applicable_offer_angle: seed.applicable_offer_angle,
                priority: seed.priority,
                is_active: seed.is_active,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/leadradar.toml")).unwrap();
        assert_eq!(config.app.owner, "local");
        assert_eq!(config.settings, Settings::default());
    }

    #[test]
    fn partial_config_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leadradar.toml");
        fs::write(
            &path,
            r#"
            [app]
            owner = "ana"

            [settings]
            order_page_url = "https://shop.example.com/order"
            job_board_blocklist = ["behance.net"]
            "#,
        )
        .unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.app.owner, "ana");
        assert_eq!(config.app.database, PathBuf::from("leadradar.db"));
        assert_eq!(config.settings.order_page_url, "https://shop.example.com/order");
        assert_eq!(config.settings.job_board_blocklist, vec!["behance.net"]);
        assert_eq!(config.settings.fu1_delay_hours, 48);
    }

    #[test]
    fn inverted_follow_up_delays_are_rejected() {
        let settings = Settings {
            fu1_delay_hours: 96,
            fu2_delay_hours: 48,
            ..Settings::default()
        };
        assert!(validate_settings(&settings).is_err());
        assert!(validate_settings(&Settings::default()).is_ok());
    }

    #[test]
    fn catalog_assigns_stable_seed_ids() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("queries.yaml"),
            r#"
queries:
  - name: "4. Rush"
    category: RUSH
    mapped_service: RUSH_12_HOUR
    base_query_text: '(rush OR urgent) ("video editor" OR editing)'
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("templates.yaml"),
            r#"
templates:
  - name: "DM #1 - General (ANY)"
    type: DM_1
    body: "Saw your post about {pain_1}."
    priority: 10
"#,
        )
        .unwrap();

        let catalog = Catalog::load_from_dir(dir.path()).unwrap();
        let now = datetime!(2025-01-01 0:00 UTC);
        let queries = catalog.query_templates("local", now);
        assert_eq!(queries[0].id, "seed-RUSH");
        assert_eq!(queries[0].engine, "bing");
        assert!(queries[0].is_active);

        let templates = catalog.outreach_templates("local", now);
        assert_eq!(templates[0].id, "seed-DM_1-10");
        assert_eq!(templates[0].applicable_buyer_type, BuyerType::Unknown);
        assert_eq!(templates[0].applicable_offer_angle, OfferAngle::Any);
    }

    #[test]
    fn shipped_catalog_covers_every_category() {
        let seed_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../seed");
        let catalog = Catalog::load_from_dir(&seed_dir).unwrap();
        let now = datetime!(2025-01-01 0:00 UTC);

        let queries = catalog.query_templates("local", now);
        assert_eq!(queries.len(), QueryCategory::ALL.len());
        for category in QueryCategory::ALL {
            assert!(queries.iter().any(|q| q.category == *category), "missing {category}");
        }

        let templates = catalog.outreach_templates("local", now);
        assert_eq!(templates.len(), 5);
        let mut ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), templates.len());
        for template_type in TemplateType::ALL {
            assert!(templates.iter().any(|t| t.template_type == *template_type));
        }
    }
}
