use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ContextError, ErrorKind};

/// One skill line of the CV.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
}

impl Skill {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Skill { name: name.into() }
    }
}

/// An entry of the education, experience or training lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionEntry {
    pub title: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
}

impl SectionEntry {
    pub fn new<S: Into<String>>(title: S) -> Self {
        SectionEntry {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dates<S: Into<String>, T: Into<String>>(mut self, start_date: S, end_date: T) -> Self {
        self.start_date = start_date.into();
        self.end_date = end_date.into();
        self
    }

    pub fn is_blank(&self) -> bool {
        is_blank(&self.title)
            && is_blank(&self.description)
            && is_blank(&self.start_date)
            && is_blank(&self.end_date)
    }

    /// The date range as displayed under the entry, e.g. `(2019 - 2023)`. Blank dates are dropped,
    /// and `None` is returned when both of them are blank.
    pub fn date_range(&self) -> Option<String> {
        let dates: Vec<&str> = [self.start_date.trim(), self.end_date.trim()]
            .into_iter()
            .filter(|date| !date.is_empty())
            .collect();
        if dates.is_empty() {
            None
        } else {
            Some(format!("({})", dates.join(" - ")))
        }
    }

    /// The lines shown below the title of the entry: the description and then the date range,
    /// each omitted when blank.
    pub fn content_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !is_blank(&self.description) {
            lines.push(self.description.trim().to_string());
        }
        if let Some(date_range) = self.date_range() {
            lines.push(date_range);
        }
        lines
    }
}

/// The kind of list a `SectionEntry` belongs to. It determines under which subtree and with
/// which key prefix and title field the entry is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Education,
    Experience,
    Training,
}

impl SectionKind {
    pub(crate) fn subtree(self) -> &'static str {
        match self {
            SectionKind::Education => "education",
            SectionKind::Experience => "experience",
            SectionKind::Training => "trainings",
        }
    }

    pub(crate) fn key_prefix(self) -> &'static str {
        match self {
            SectionKind::Education => "edu",
            SectionKind::Experience => "exp",
            SectionKind::Training => "tra",
        }
    }

    pub(crate) fn title_field(self) -> &'static str {
        match self {
            SectionKind::Education => "eduName",
            SectionKind::Experience => "expName",
            SectionKind::Training => "trainingName",
        }
    }
}

/// The fully-resolved contents of one CV, ready to be rendered.
///
/// Every field may be blank: the renderer omits whatever has no content. A `CvDocument` is
/// a snapshot, so once it is handed to the renderer it is shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CvDocument {
    pub full_name: String,
    pub profession: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub profile_description: String,
    pub photo_url: String,
    pub skills: Vec<Skill>,
    pub education: Vec<SectionEntry>,
    pub experience: Vec<SectionEntry>,
    pub training: Vec<SectionEntry>,
}

impl CvDocument {
    /// Reads a CV snapshot from a JSON file. The file holds the `cvdata` subtree as it is kept
    /// in the document store (see `CvDocument::from_tree`).
    pub fn from_path(cv_path: &Path) -> Result<CvDocument, ContextError> {
        let cv_content = std::fs::read_to_string(cv_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Io,
                format!("Unable to read the CV snapshot {:?}", cv_path),
                &error,
            )
        })?;
        let tree: Value = serde_json::from_str(&cv_content).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Data,
                format!("Unable to parse the CV snapshot {:?}", cv_path),
                &error,
            )
        })?;

        Ok(CvDocument::from_tree(&tree))
    }

    /// Resolves a CV from the `cvdata` subtree of the document store.
    ///
    /// Missing values default to blank strings. List entries are ordered by the ordinal in
    /// their key (`edu1`, `edu2`, ..., `edu10`), entries without a title and skills without
    /// a name are skipped.
    pub fn from_tree(tree: &Value) -> CvDocument {
        let personal_info = tree.get("personalinfo");
        let personal_field = |field: &str| {
            personal_info
                .and_then(|personal_info| personal_info.get(field))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let skills = ordered_children(tree.get("skills"), "skills")
            .into_iter()
            .filter_map(|child| child.get("name").and_then(Value::as_str))
            .map(Skill::new)
            .collect();

        CvDocument {
            full_name: personal_field("fullname"),
            profession: personal_field("profession"),
            email: personal_field("email"),
            phone: personal_field("phonenumber"),
            address: personal_field("address"),
            profile_description: personal_field("profileDescription"),
            photo_url: tree
                .get("image")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            skills,
            education: section_entries(tree, SectionKind::Education),
            experience: section_entries(tree, SectionKind::Experience),
            training: section_entries(tree, SectionKind::Training),
        }
    }

    /// Builds the children to be merged into the `cvdata` subtree when saving the CV.
    ///
    /// The personal information is only present when one of its fields is filled in, blank
    /// list entries are dropped and the remaining ones are keyed by their 1-based position.
    /// The photo URL is not part of it, it is written on its own once the photo is uploaded.
    pub fn to_tree(&self) -> Result<Map<String, Value>, ContextError> {
        if self.is_blank() {
            return Err(ContextError::with_context(
                ErrorKind::EmptyDocument,
                "Please fill at least one section before saving",
            ));
        }

        let mut tree = Map::new();

        let personal_fields = [
            ("fullname", &self.full_name),
            ("profession", &self.profession),
            ("email", &self.email),
            ("phonenumber", &self.phone),
            ("address", &self.address),
            ("profileDescription", &self.profile_description),
        ];
        if personal_fields.iter().any(|(_, value)| !is_blank(value)) {
            let personal_info: Map<String, Value> = personal_fields
                .iter()
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect();
            tree.insert("personalinfo".into(), Value::Object(personal_info));
        }

        for (kind, entries) in [
            (SectionKind::Education, &self.education),
            (SectionKind::Experience, &self.experience),
            (SectionKind::Training, &self.training),
        ] {
            let children = entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| !entry.is_blank())
                .map(|(index, entry)| {
                    let mut child = Map::new();
                    child.insert(kind.title_field().into(), entry.title.clone().into());
                    child.insert("description".into(), entry.description.clone().into());
                    child.insert("startDate".into(), entry.start_date.clone().into());
                    child.insert("endDate".into(), entry.end_date.clone().into());
                    (format!("{}{}", kind.key_prefix(), index + 1), Value::Object(child))
                })
                .collect();
            tree.insert(kind.subtree().into(), Value::Object(children));
        }

        let skills = self
            .skills
            .iter()
            .enumerate()
            .filter(|(_, skill)| !is_blank(&skill.name))
            .map(|(index, skill)| {
                let mut child = Map::new();
                child.insert("name".into(), skill.name.clone().into());
                (format!("skills{}", index + 1), Value::Object(child))
            })
            .collect();
        tree.insert("skills".into(), Value::Object(skills));

        Ok(tree)
    }

    /// Whether there is nothing to show or save at all.
    pub fn is_blank(&self) -> bool {
        [
            &self.full_name,
            &self.profession,
            &self.email,
            &self.phone,
            &self.address,
            &self.profile_description,
        ]
        .iter()
        .all(|value| is_blank(value))
            && self.skills.iter().all(|skill| is_blank(&skill.name))
            && self.education.iter().all(SectionEntry::is_blank)
            && self.experience.iter().all(SectionEntry::is_blank)
            && self.training.iter().all(SectionEntry::is_blank)
    }

    /// The skill names that have content, in order.
    pub fn visible_skills(&self) -> impl Iterator<Item = &str> {
        self.skills
            .iter()
            .map(|skill| skill.name.trim())
            .filter(|name| !name.is_empty())
    }
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn section_entries(tree: &Value, kind: SectionKind) -> Vec<SectionEntry> {
    ordered_children(tree.get(kind.subtree()), kind.key_prefix())
        .into_iter()
        .filter_map(|child| {
            let title = child.get(kind.title_field()).and_then(Value::as_str)?;
            let field = |name: &str| {
                child
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Some(SectionEntry {
                title: title.to_string(),
                description: field("description"),
                start_date: field("startDate"),
                end_date: field("endDate"),
            })
        })
        .collect()
}

/// Collects the children of a list subtree ordered by the ordinal that follows the key prefix.
/// Keys that do not carry an ordinal are kept after the numbered ones, in key order. Arrays are
/// accepted as well, in which case their order is kept.
fn ordered_children<'a>(subtree: Option<&'a Value>, key_prefix: &str) -> Vec<&'a Value> {
    match subtree {
        Some(Value::Object(children)) => {
            let mut keyed: Vec<(Option<u64>, &String, &Value)> = children
                .iter()
                .map(|(key, child)| {
                    let ordinal = key
                        .strip_prefix(key_prefix)
                        .and_then(|ordinal| ordinal.parse::<u64>().ok());
                    (ordinal, key, child)
                })
                .collect();
            keyed.sort_by(|(ordinal, key, _), (other_ordinal, other_key, _)| {
                match (ordinal, other_ordinal) {
                    (Some(ordinal), Some(other_ordinal)) => ordinal.cmp(other_ordinal),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => key.cmp(other_key),
                }
            });
            keyed.into_iter().map(|(_, _, child)| child).collect()
        }
        Some(Value::Array(children)) => children.iter().collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tree_is_resolved_in_ordinal_order_and_skips_untitled_entries() {
        let tree = json!({
            "personalinfo": {
                "fullname": "Jane Doe",
                "email": "jane@x.com",
                "phonenumber": "+1 555 0100"
            },
            "image": "file:///photos/jane.jpg",
            "education": {
                "edu10": { "eduName": "PhD", "startDate": "2020" },
                "edu2": { "eduName": "MSc", "description": "Databases" },
                "edu1": { "eduName": "BSc", "startDate": "2012", "endDate": "2015" },
                "edu3": { "description": "no title, skipped" }
            },
            "skills": {
                "skills2": { "name": "SQL" },
                "skills1": { "name": "Go" },
                "skills3": { "level": "missing name" }
            }
        });

        let cv = CvDocument::from_tree(&tree);

        assert_eq!(cv.full_name, "Jane Doe");
        assert_eq!(cv.phone, "+1 555 0100");
        assert_eq!(cv.profession, "");
        assert_eq!(cv.photo_url, "file:///photos/jane.jpg");
        assert_eq!(cv.skills, vec![Skill::new("Go"), Skill::new("SQL")]);
        let titles: Vec<&str> = cv.education.iter().map(|entry| entry.title.as_str()).collect();
        assert_eq!(titles, vec!["BSc", "MSc", "PhD"]);
        assert!(cv.experience.is_empty());
        assert!(cv.training.is_empty());
    }

    #[test]
    fn saving_drops_blank_entries_and_keeps_ordinals() {
        let cv = CvDocument {
            email: "jane@x.com".into(),
            experience: vec![
                SectionEntry::new("Backend engineer").with_dates("2019", "2023"),
                SectionEntry::default(),
                SectionEntry::new("Tech lead"),
            ],
            skills: vec![Skill::new("Go"), Skill::new("  ")],
            ..Default::default()
        };

        let tree = cv.to_tree().unwrap();

        assert_eq!(tree["personalinfo"]["email"], "jane@x.com");
        let experience = tree["experience"].as_object().unwrap();
        assert_eq!(experience.len(), 2);
        assert_eq!(experience["exp1"]["expName"], "Backend engineer");
        assert_eq!(experience["exp3"]["expName"], "Tech lead");
        assert_eq!(tree["skills"].as_object().unwrap().len(), 1);
        assert!(tree["education"].as_object().unwrap().is_empty());

        let reloaded = CvDocument::from_tree(&Value::Object(tree));
        assert_eq!(reloaded.experience.len(), 2);
        assert_eq!(reloaded.experience[0].end_date, "2023");
    }

    #[test]
    fn personal_info_is_omitted_when_blank() {
        let cv = CvDocument {
            skills: vec![Skill::new("Rust")],
            ..Default::default()
        };
        let tree = cv.to_tree().unwrap();
        assert!(!tree.contains_key("personalinfo"));
    }

    #[test]
    fn blank_document_cannot_be_saved() {
        let cv = CvDocument {
            education: vec![SectionEntry::new(" ")],
            ..Default::default()
        };
        let error = cv.to_tree().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::EmptyDocument);
    }

    #[test]
    fn content_lines_omit_blank_parts() {
        let entry = SectionEntry::new("BSc").with_dates("2012", "");
        assert_eq!(entry.content_lines(), vec!["(2012)".to_string()]);

        let entry = SectionEntry::new("BSc")
            .with_description("Computer science")
            .with_dates("2012", "2015");
        assert_eq!(
            entry.content_lines(),
            vec!["Computer science".to_string(), "(2012 - 2015)".to_string()]
        );

        assert!(SectionEntry::new("BSc").content_lines().is_empty());
    }
}
