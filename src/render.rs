//! Markdown note rendering.
//!
//! A [`NormalizedNote`] plus source references become the note text
//! written into the vault. The default template is embedded; a vault can
//! override it via `[vault].template`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use minijinja::{context, Environment};
use serde::Serialize;

use crate::models::NormalizedNote;

const DEFAULT_TEMPLATE: &str = r#"---
title: "{{ title }}"
source_type: {{ source_type }}
created: {{ created_at }}
confidence: {{ confidence }}
tags: [{% for tag in tags %}{{ tag }}{% if not loop.last %}, {% endif %}{% endfor %}]
---

# {{ title }}

## Summary
{% for line in summary %}
- {{ line }}
{% endfor %}
{% if decisions %}
## Decisions
{% for decision in decisions %}
- {{ decision }}
{% endfor %}
{% endif %}
{% if actions %}
## Actions
{% for action in actions %}
- [ ] {{ action.what }}{% if action.who %} ({{ action.who | wikilink }}){% endif %}{% if action.due %} due {{ action.due }}{% endif %}
{% endfor %}
{% endif %}
{% if entities %}
## Entities
{% for entity in entities %}
- {{ entity.type }}: {{ entity.value | wikilink }}
{% endfor %}
{% endif %}
{% if projects %}
## Projects
{% for project in projects %}
- {{ project | wikilink }}
{% endfor %}
{% endif %}
{% if people %}
## People
{% for person in people %}
- {{ person | wikilink }}
{% endfor %}
{% endif %}
## Sources
{% for link in source_links %}
- {{ link }}
{% endfor %}
"#;

/// Pluggable note rendering seam.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        note: &NormalizedNote,
        source_links: &[String],
        source_type: &str,
        created_at: DateTime<Utc>,
    ) -> Result<String>;
}

/// Template-driven markdown renderer.
pub struct MarkdownRenderer {
    template_source: String,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            template_source: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Use a template file instead of the built-in one.
    pub fn with_template_file(path: &std::path::Path) -> Result<Self> {
        let template_source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read note template: {}", path.display()))?;
        Ok(Self { template_source })
    }

    fn environment(&self) -> Result<Environment<'_>> {
        let mut env = Environment::new();
        env.add_filter("wikilink", wikilink);
        env.add_template("note", &self.template_source)
            .context("Invalid note template")?;
        Ok(env)
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn wikilink(value: String) -> String {
    if value.is_empty() {
        return value;
    }
    format!("[[{}]]", value)
}

#[derive(Serialize)]
struct EntityContext<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

impl Renderer for MarkdownRenderer {
    fn render(
        &self,
        note: &NormalizedNote,
        source_links: &[String],
        source_type: &str,
        created_at: DateTime<Utc>,
    ) -> Result<String> {
        let env = self.environment()?;
        let template = env.get_template("note").context("note template missing")?;

        let entities: Vec<EntityContext<'_>> = note
            .entities
            .iter()
            .map(|e| EntityContext {
                kind: &e.kind,
                value: &e.value,
            })
            .collect();

        let rendered = template
            .render(context! {
                title => &note.title,
                summary => &note.summary,
                decisions => &note.decisions,
                actions => &note.actions,
                entities => entities,
                tags => &note.tags,
                projects => &note.projects,
                people => &note.people,
                confidence => note.confidence,
                source_links => source_links,
                source_type => source_type,
                created_at => created_at.to_rfc3339(),
            })
            .context("Failed to render note template")?;

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionItem, Entity};

    fn sample_note() -> NormalizedNote {
        NormalizedNote {
            title: "Weekly sync".to_string(),
            summary: vec!["Discussed roadmap".to_string()],
            decisions: vec!["Ship v2 in March".to_string()],
            actions: vec![ActionItem {
                what: "Draft announcement".to_string(),
                who: Some("ada".to_string()),
                due: Some("2026-03-01".to_string()),
                evidence: None,
            }],
            entities: vec![Entity {
                kind: "org".to_string(),
                value: "Acme".to_string(),
            }],
            tags: vec!["meeting".to_string()],
            projects: vec!["v2".to_string()],
            people: vec!["ada".to_string()],
            confidence: 0.9,
        }
    }

    #[test]
    fn renders_all_sections() {
        let rendered = MarkdownRenderer::new()
            .render(
                &sample_note(),
                &["Original: file:///docs/sync.md".to_string()],
                "file",
                Utc::now(),
            )
            .unwrap();

        assert!(rendered.contains("# Weekly sync"));
        assert!(rendered.contains("- Discussed roadmap"));
        assert!(rendered.contains("Ship v2 in March"));
        assert!(rendered.contains("[ ] Draft announcement"));
        assert!(rendered.contains("[[Acme]]"));
        assert!(rendered.contains("[[v2]]"));
        assert!(rendered.contains("Original: file:///docs/sync.md"));
        assert!(rendered.contains("source_type: file"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let mut note = sample_note();
        note.decisions.clear();
        note.projects.clear();

        let rendered = MarkdownRenderer::new()
            .render(&note, &[], "file", Utc::now())
            .unwrap();
        assert!(!rendered.contains("## Decisions"));
        assert!(!rendered.contains("## Projects"));
    }

    #[test]
    fn wikilink_filter_wraps_values() {
        assert_eq!(wikilink("ada".to_string()), "[[ada]]");
        assert_eq!(wikilink(String::new()), "");
    }
}
