// In many cases, we need to do a let binding to satisfy the borrow checker
// and for some reason, clippy identifies those as unnecessary.
#![allow(clippy::let_and_return)]

use super::{
    codec,
    config::{CELL_PREVIEW_CHARS, DEFAULT_PER_PAGE, NEW_PROPERTY_ROWS},
    flash::Flash,
    form,
    models::{
        Entity, EntityPage, Pagination, ProjectContext, PropertyTypeTag,
        PropertyValue,
    },
    routes::Route,
};
use ammonia::clean_text as clean;
use std::{collections::BTreeSet, fmt::Write};

const STYLE: &str = r#"
    body { font-family: system-ui, sans-serif; margin: 0; color: #1f2937; background: #f9fafb; }
    header { display: flex; align-items: center; justify-content: space-between; gap: 1rem; padding: 0.75rem 2rem; background: #312e81; color: white; }
    header a { color: white; text-decoration: none; font-weight: bold; }
    main { padding: 1rem 2rem; }
    a { color: #4338ca; }
    table { border-collapse: collapse; width: 100%; background: white; }
    th, td { border: 1px solid #e5e7eb; padding: 0.35rem 0.5rem; text-align: left; vertical-align: top; }
    th { background: #eef2ff; }
    pre, textarea, .mono { font-family: ui-monospace, monospace; font-size: 0.85rem; }
    pre { margin: 0; white-space: pre-wrap; word-break: break-all; }
    textarea { width: 100%; min-height: 4rem; }
    input[type=text], input[type=number] { width: 100%; box-sizing: border-box; }
    .flash { padding: 0.5rem 1rem; margin-bottom: 1rem; border-radius: 0.25rem; }
    .flash-success { background: #dcfce7; }
    .flash-error { background: #fee2e2; }
    .flash-info { background: #e0f2fe; }
    .muted { color: #6b7280; font-size: 0.85rem; }
    .actions { display: flex; gap: 0.5rem; align-items: center; margin: 1rem 0; }
    .danger { background: #dc2626; color: white; border: none; padding: 0.3rem 0.8rem; border-radius: 0.25rem; cursor: pointer; }
    .pager { display: flex; gap: 1rem; align-items: center; margin: 1rem 0; }
"#;

pub trait Component {
    /// Render the component to a HTML string. By convention, the
    /// implementation should sanitize all string properties at render-time
    fn render(&self) -> String;
}

pub struct Page<'a> {
    pub title: String,
    pub ctx: &'a ProjectContext,
    pub projects: &'a [String],
    pub flash: Option<&'a Flash>,
    pub children: Box<dyn Component + 'a>,
}
impl Component for Page<'_> {
    fn render(&self) -> String {
        let switcher = ProjectSwitcher {
            current: &self.ctx.project_id,
            projects: self.projects,
        }
        .render();
        let flash = self
            .flash
            .map(|f| FlashBanner { flash: f }.render())
            .unwrap_or_default();
        format!(
            r#"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8" />
                    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
                    <title>{title}</title>
                    <style>{STYLE}</style>
                </head>
                <body>
                    <header>
                        <a href="{root}">Datastore Browser</a>
                        {switcher}
                    </header>
                    <main>
                        {flash}
                        {body_html}
                    </main>
                </body>
            </html>
            "#,
            title = clean(&self.title),
            root = Route::Root,
            body_html = self.children.render()
        )
    }
}

struct ProjectSwitcher<'a> {
    current: &'a str,
    projects: &'a [String],
}
impl Component for ProjectSwitcher<'_> {
    fn render(&self) -> String {
        if self.projects.len() < 2 {
            return format!(
                r#"<span class="mono">{}</span>"#,
                clean(self.current)
            );
        }
        let options = self.projects.iter().fold(String::new(), |mut s, p| {
            let selected = if p == self.current { "selected" } else { "" };
            let p = clean(p);
            let _ = write!(s, r#"<option value="{p}" {selected}>{p}</option>"#);
            s
        });
        format!(
            r#"
            <form method="post" action="{action}">
                <label for="project">Project</label>
                <select id="project" name="project">{options}</select>
                <button>Switch</button>
            </form>
            "#,
            action = Route::SelectProject
        )
    }
}

struct FlashBanner<'a> {
    flash: &'a Flash,
}
impl Component for FlashBanner<'_> {
    fn render(&self) -> String {
        format!(
            r#"<div class="flash flash-{level}">{message}</div>"#,
            level = self.flash.level,
            message = clean(&self.flash.message)
        )
    }
}

pub struct KindList<'a> {
    pub kinds: &'a [String],
}
impl Component for KindList<'_> {
    fn render(&self) -> String {
        if self.kinds.is_empty() {
            return r#"
                <h1>Kinds</h1>
                <p>No kinds found in this project.</p>
                <p class="muted">Run <code>datastore-browser seed</code> to load some sample entities.</p>
            "#
            .to_string();
        }
        let rows = self.kinds.iter().fold(String::new(), |mut s, kind| {
            let _ = write!(
                s,
                r#"
                <tr>
                    <td><a href="{browse}">{name}</a></td>
                    <td><a href="{new}">New entity</a></td>
                </tr>
                "#,
                browse = Route::Kind(kind),
                new = Route::NewEntity(kind),
                name = clean(kind)
            );
            s
        });
        format!(
            r#"
            <h1>Kinds</h1>
            <table>
                <thead><tr><th>Kind</th><th></th></tr></thead>
                <tbody>{rows}</tbody>
            </table>
            "#
        )
    }
}

/// One page of a kind as a table, with a column for every property that
/// appears on any entity of the page.
pub struct EntityTable<'a> {
    pub kind: &'a str,
    pub page: &'a EntityPage,
    pub pagination: Pagination,
}
impl Component for EntityTable<'_> {
    fn render(&self) -> String {
        let kind = clean(self.kind);
        let new_link = Route::NewEntity(self.kind);
        let pager = Paginator {
            kind: self.kind,
            pagination: self.pagination,
        }
        .render();
        if self.page.entities.is_empty() {
            return format!(
                r#"
                <h1>{kind}</h1>
                <div class="actions"><a href="{new_link}">New entity</a></div>
                <p>No entities on this page.</p>
                {pager}
                "#
            );
        }
        let columns: BTreeSet<&str> = self
            .page
            .entities
            .iter()
            .flat_map(|e| e.properties.keys().map(String::as_str))
            .collect();
        let header = columns.iter().fold(String::new(), |mut s, c| {
            let _ = write!(s, "<th>{}</th>", clean(c));
            s
        });
        let rows = self.page.entities.iter().fold(String::new(), |mut s, e| {
            let id = e.key.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
            let cells = columns.iter().fold(String::new(), |mut s, c| {
                let text = e.properties.get(*c).map(cell_text).unwrap_or_default();
                let _ = write!(s, "<td>{}</td>", clean(&text));
                s
            });
            let _ = write!(
                s,
                r#"
                <tr>
                    <td><a href="{view}">{id_text}</a></td>
                    {cells}
                    <td><a href="{edit}">Edit</a></td>
                </tr>
                "#,
                view = Route::Entity { kind: self.kind, id: &id },
                edit = Route::EditEntity { kind: self.kind, id: &id },
                id_text = clean(&id)
            );
            s
        });
        format!(
            r#"
            <h1>{kind}</h1>
            <div class="actions"><a href="{new_link}">New entity</a></div>
            <table>
                <thead><tr><th>ID</th>{header}<th></th></tr></thead>
                <tbody>{rows}</tbody>
            </table>
            {pager}
            "#
        )
    }
}

/// Short single-line text for a table cell.
fn cell_text(value: &PropertyValue) -> String {
    let full = match value {
        PropertyValue::Array(_) | PropertyValue::Object(_) => {
            codec::to_json(value).to_string()
        }
        other => codec::display(other),
    };
    if full.chars().count() > CELL_PREVIEW_CHARS {
        let cut: String = full.chars().take(CELL_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        full
    }
}

struct Paginator<'a> {
    kind: &'a str,
    pagination: Pagination,
}
impl Component for Paginator<'_> {
    fn render(&self) -> String {
        let p = self.pagination;
        let link = |page: u32, text: &str| {
            let href = Route::KindPage {
                kind: self.kind,
                page,
                per_page: p.per_page,
            };
            format!(r#"<a href="{href}">{text}</a>"#)
        };
        let prev = if p.has_prev() {
            link(p.page - 1, "&larr; Previous")
        } else {
            String::new()
        };
        let next = if p.has_next() {
            link(p.page + 1, "Next &rarr;")
        } else {
            String::new()
        };
        let per_page_note = if p.per_page == DEFAULT_PER_PAGE {
            String::new()
        } else {
            format!(" ({} per page)", p.per_page)
        };
        format!(
            r#"
            <div class="pager">
                {prev}
                <span>Page {page} of {pages}, {total} entities{per_page_note}</span>
                {next}
            </div>
            "#,
            page = p.page,
            pages = p.total_pages().max(1),
            total = p.total_count
        )
    }
}

pub struct EntityDetail<'a> {
    pub entity: &'a Entity,
}
impl Component for EntityDetail<'_> {
    fn render(&self) -> String {
        let key = &self.entity.key;
        let kind = &key.kind;
        let id = key.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
        let rows = self.entity.properties.iter().fold(
            String::new(),
            |mut s, (name, value)| {
                let _ = write!(
                    s,
                    r#"
                    <tr>
                        <th>{name}</th>
                        <td class="muted">{tag}</td>
                        <td><pre>{value}</pre></td>
                    </tr>
                    "#,
                    name = clean(name),
                    tag = value.type_tag(),
                    value = clean(&codec::display(value))
                );
                s
            },
        );
        format!(
            r#"
            <p><a href="{back}">&larr; {kind_text}</a></p>
            <h1>{kind_text} {id_text}</h1>
            <p class="mono">{key_text}</p>
            <table>
                <thead><tr><th>Property</th><th>Type</th><th>Value</th></tr></thead>
                <tbody>{rows}</tbody>
            </table>
            <div class="actions">
                <a href="{edit}">Edit</a>
                <form method="post" action="{delete}" onsubmit="return confirm('Delete this entity?')">
                    <button class="danger">Delete</button>
                </form>
            </div>
            "#,
            back = Route::Kind(kind),
            edit = Route::EditEntity { kind, id: &id },
            delete = Route::DeleteEntity { kind, id: &id },
            kind_text = clean(kind),
            id_text = clean(&id),
            key_text = clean(&key.to_string())
        )
    }
}

/// Edit form for an existing entity (`entity` is set) or create form for a
/// new one of `kind`.
pub struct EntityForm<'a> {
    pub kind: &'a str,
    pub entity: Option<&'a Entity>,
    pub error: Option<&'a str>,
}
impl Component for EntityForm<'_> {
    fn render(&self) -> String {
        let kind = self.kind;
        let error = self
            .error
            .map(|e| format!(r#"<div class="flash flash-error">{}</div>"#, clean(e)))
            .unwrap_or_default();
        let (heading, action, cancel, id_field, new_rows) = match self.entity {
            Some(entity) => {
                let id = entity
                    .key
                    .id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                (
                    format!("Edit {} {}", clean(kind), clean(&id)),
                    Route::EditEntity { kind, id: &id }.to_string(),
                    Route::Entity { kind, id: &id }.to_string(),
                    String::new(),
                    1,
                )
            }
            None => (
                format!("New {}", clean(kind)),
                Route::NewEntity(kind).to_string(),
                Route::Kind(kind).to_string(),
                format!(
                    r#"
                    <p>
                        <label for="entity_id">ID or name</label>
                        <input type="text" id="entity_id" name="{field}" placeholder="leave blank to allocate an id" />
                    </p>
                    "#,
                    field = form::ENTITY_ID_FIELD
                ),
                NEW_PROPERTY_ROWS,
            ),
        };
        let existing = self
            .entity
            .map(|e| {
                e.properties.iter().fold(String::new(), |mut s, (name, value)| {
                    s.push_str(&PropertyRow { name, value }.render());
                    s
                })
            })
            .unwrap_or_default();
        let existing_table = if existing.is_empty() {
            String::new()
        } else {
            format!(
                r#"
                <table>
                    <thead><tr><th>Property</th><th>Type</th><th>Value</th><th>Delete</th></tr></thead>
                    <tbody>{existing}</tbody>
                </table>
                "#
            )
        };
        let new_rows = (0..new_rows)
            .map(|i| NewPropertyRow { index: i }.render())
            .collect::<Vec<String>>()
            .join("");
        format!(
            r#"
            <h1>{heading}</h1>
            {error}
            <form method="post" action="{action}">
                {id_field}
                {existing_table}
                <h2>Add properties</h2>
                <table>
                    <thead><tr><th>Name</th><th>Type</th><th>Value</th></tr></thead>
                    <tbody>{new_rows}</tbody>
                </table>
                <div class="actions">
                    <button>Save</button>
                    <a href="{cancel}">Cancel</a>
                </div>
            </form>
            "#
        )
    }
}

struct PropertyRow<'a> {
    name: &'a str,
    value: &'a PropertyValue,
}
impl Component for PropertyRow<'_> {
    fn render(&self) -> String {
        let name = clean(self.name);
        let delete = clean(&form::delete_field(self.name));
        let tag = self.value.type_tag();
        // Values we can't represent in a form are left alone on submit,
        // since nothing mentions them.
        if tag == PropertyTypeTag::Unknown {
            return format!(
                r#"
                <tr>
                    <th>{name}</th>
                    <td class="muted">{tag}</td>
                    <td><pre>{value}</pre><span class="muted">not editable here</span></td>
                    <td><input type="checkbox" name="{delete}" /></td>
                </tr>
                "#,
                value = clean(&codec::display(self.value))
            );
        }
        format!(
            r#"
            <tr>
                <th>{name}</th>
                <td>{select}</td>
                <td>{input}</td>
                <td><input type="checkbox" name="{delete}" /></td>
            </tr>
            "#,
            select = TypeSelect {
                field: &form::type_field(self.name),
                selected: tag
            }
            .render(),
            input = PropertyInput {
                field: &form::value_field(self.name),
                value: self.value
            }
            .render()
        )
    }
}

struct NewPropertyRow {
    index: usize,
}
impl Component for NewPropertyRow {
    fn render(&self) -> String {
        let i = self.index;
        format!(
            r#"
            <tr>
                <td><input type="text" name="{name_prefix}{i}" /></td>
                <td>{select}</td>
                <td><textarea name="{value_prefix}{i}" rows="1"></textarea></td>
            </tr>
            "#,
            name_prefix = form::NEW_NAME_PREFIX,
            value_prefix = form::NEW_VALUE_PREFIX,
            select = TypeSelect {
                field: &format!("{}{i}", form::NEW_TYPE_PREFIX),
                selected: PropertyTypeTag::String
            }
            .render()
        )
    }
}

struct TypeSelect<'a> {
    field: &'a str,
    selected: PropertyTypeTag,
}
impl Component for TypeSelect<'_> {
    fn render(&self) -> String {
        let options = PropertyTypeTag::ALL
            .iter()
            .filter(|tag| **tag != PropertyTypeTag::Unknown)
            .fold(String::new(), |mut s, tag| {
                let selected = if *tag == self.selected { "selected" } else { "" };
                let _ = write!(s, r#"<option value="{tag}" {selected}>{tag}</option>"#);
                s
            });
        format!(
            r#"<select name="{field}">{options}</select>"#,
            field = clean(self.field)
        )
    }
}

/// The editing widget for one value, picked by its type.
struct PropertyInput<'a> {
    field: &'a str,
    value: &'a PropertyValue,
}
impl Component for PropertyInput<'_> {
    fn render(&self) -> String {
        let field = clean(self.field);
        let text = codec::encode(self.value);
        let value = clean(&text);
        match self.value {
            PropertyValue::Boolean(b) => {
                let checked = if *b { "checked" } else { "" };
                format!(
                    r#"<input type="checkbox" name="{field}" value="{on}" {checked} />"#,
                    on = codec::CHECKBOX_ON
                )
            }
            PropertyValue::Integer(_) => format!(
                r#"<input type="number" step="1" name="{field}" value="{value}" />"#
            ),
            PropertyValue::Null => format!(
                r#"<input type="text" name="{field}" value="" placeholder="null" />"#
            ),
            PropertyValue::Blob(_)
            | PropertyValue::Array(_)
            | PropertyValue::Object(_) => {
                let rows = text.lines().count().clamp(2, 20);
                format!(
                    "<textarea name=\"{field}\" rows=\"{rows}\">\n{value}</textarea>"
                )
            }
            PropertyValue::String(s) if s.contains('\n') || s.len() > 80 => {
                // the parser drops one newline after the open tag, so it
                // must be ours and not the value's
                format!("<textarea name=\"{field}\" rows=\"4\">\n{value}</textarea>")
            }
            _ => format!(r#"<input type="text" name="{field}" value="{value}" />"#),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, EntityKey};

    fn entity() -> Entity {
        let mut e = Entity::new(EntityKey::new("User", EntityId::Id(1)));
        e.properties
            .insert("name".into(), PropertyValue::String("<b>John</b>".into()));
        e.properties
            .insert("active".into(), PropertyValue::Boolean(true));
        e.properties
            .insert("age".into(), PropertyValue::Integer(30));
        e
    }

    #[test]
    fn test_user_data_is_escaped() {
        let e = entity();
        let html = EntityDetail { entity: &e }.render();
        assert!(!html.contains("<b>John</b>"));
        assert!(html.contains("&lt;b&gt;John&lt;&#47;b&gt;"));
    }

    #[test]
    fn test_form_fields_follow_the_naming_contract() {
        let e = entity();
        let html = EntityForm {
            kind: "User",
            entity: Some(&e),
            error: None,
        }
        .render();
        assert!(html.contains(r#"name="prop:age" value="30""#));
        assert!(html.contains(r#"name="type:active""#));
        assert!(html.contains(r#"name="prop:active" value="on" checked"#));
        assert!(html.contains(r#"name="delete:name""#));
        assert!(html.contains(r#"name="new_name.0""#));
        assert!(!html.contains(r#"name="new_name.1""#));
        assert!(!html.contains("entity_id"));
    }

    #[test]
    fn test_create_form_has_id_field_and_blank_rows() {
        let html = EntityForm {
            kind: "User",
            entity: None,
            error: Some("bad json"),
        }
        .render();
        assert!(html.contains(r#"name="entity_id""#));
        assert!(html.contains(&format!(r#"name="new_type.{}""#, NEW_PROPERTY_ROWS - 1)));
        assert!(html.contains("bad&#32;json"));
    }

    #[test]
    fn test_textarea_content_starts_after_a_newline() {
        let value = PropertyValue::String("\nindented\nbody".into());
        let html = PropertyInput {
            field: "prop:bio",
            value: &value,
        }
        .render();
        assert!(html.contains(
            "rows=\"4\">\n&#10;indented&#10;body</textarea>"
        ));
    }

    #[test]
    fn test_table_columns_are_the_union_of_properties() {
        let mut other = Entity::new(EntityKey::new("User", EntityId::Id(2)));
        other
            .properties
            .insert("email".into(), PropertyValue::String("a@b.c".into()));
        let page = EntityPage {
            entities: vec![entity(), other],
            total_count: 2,
        };
        let mut pagination = Pagination::new(None, None);
        pagination.total_count = 2;
        let html = EntityTable {
            kind: "User",
            page: &page,
            pagination,
        }
        .render();
        for column in ["active", "age", "email", "name"] {
            assert!(html.contains(&format!("<th>{column}</th>")), "{column}");
        }
        assert!(html.contains("Page 1 of 1, 2 entities"));
        assert!(!html.contains("Next"));
    }

    #[test]
    fn test_long_cells_are_truncated() {
        let text = cell_text(&PropertyValue::String("x".repeat(200)));
        assert_eq!(text.chars().count(), CELL_PREVIEW_CHARS + 3);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_opaque_values_are_not_editable() {
        let value = PropertyValue::Opaque(serde_json::json!({
            "geoPointValue": {"latitude": 1.0, "longitude": 2.0}
        }));
        let html = PropertyRow {
            name: "where",
            value: &value,
        }
        .render();
        assert!(!html.contains("prop:where"));
        assert!(!html.contains("type:where"));
        assert!(html.contains("delete:where"));
    }
}
