use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::cv::CvDocument;
use crate::error::{ContextError, ErrorKind};
use crate::export::random_identifier;

/// Structured persistence of the CVs, keyed by user.
pub trait CvStore {
    /// Reads the CV of the user once. A user without a CV gets a blank one.
    fn fetch_cv(&self, user_id: &str) -> Result<CvDocument, ContextError>;
    /// Merges the sections of the CV into the stored one, replacing each section wholesale.
    fn save_cv(&self, user_id: &str, document: &CvDocument) -> Result<(), ContextError>;
    fn set_photo_url(&self, user_id: &str, photo_url: &str) -> Result<(), ContextError>;
}

/// Storage of binary assets, addressed by URL.
pub trait BlobStore {
    /// Stores the payload under `profile_images/<user>/` and returns the URL it can be fetched from.
    fn upload(&self, user_id: &str, payload: &[u8], extension: &str) -> Result<String, ContextError>;
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ContextError>;
}

/// Who is signed in, if anybody.
pub trait Identity {
    fn current_user_id(&self) -> Option<String>;
}

/// The signed-in user, or an `ErrorKind::Unauthenticated` error.
pub fn require_user(identity: &dyn Identity) -> Result<String, ContextError> {
    identity.current_user_id().ok_or(ContextError::with_context(
        ErrorKind::Unauthenticated,
        "Please sign in to save your CV!",
    ))
}

/// Uploads a profile photo for the signed-in user and records its URL in their CV.
pub fn upload_profile_photo(
    identity: &dyn Identity,
    cv_store: &dyn CvStore,
    blob_store: &dyn BlobStore,
    payload: &[u8],
    extension: &str,
) -> Result<String, ContextError> {
    let user_id = require_user(identity)?;
    let photo_url = blob_store.upload(&user_id, payload, extension)?;
    cv_store.set_photo_url(&user_id, &photo_url)?;
    log::info!("Uploaded the profile photo of {} to {}", user_id, photo_url);

    Ok(photo_url)
}

/// A fixed identity, `None` meaning that nobody is signed in.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    pub fn signed_in<S: Into<String>>(user_id: S) -> Self {
        StaticIdentity(Some(user_id.into()))
    }

    pub fn signed_out() -> Self {
        StaticIdentity(None)
    }
}

impl Identity for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A document store holding the whole tree (`users/<uid>/cvdata/...`) in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonTreeStore {
    tree_path: PathBuf,
}

impl JsonTreeStore {
    pub fn new<P: Into<PathBuf>>(tree_path: P) -> Self {
        JsonTreeStore {
            tree_path: tree_path.into(),
        }
    }

    pub fn tree_path(&self) -> &Path {
        &self.tree_path
    }

    fn load_tree(&self) -> Result<Value, ContextError> {
        if !self.tree_path.exists() {
            return Ok(Value::Object(Map::new()));
        }
        let tree_content = std::fs::read_to_string(&self.tree_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Io,
                format!("Unable to read the document store {:?}", self.tree_path),
                &error,
            )
        })?;
        serde_json::from_str(&tree_content).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Data,
                format!("Unable to parse the document store {:?}", self.tree_path),
                &error,
            )
        })
    }

    fn store_tree(&self, tree: &Value) -> Result<(), ContextError> {
        let tree_content = serde_json::to_string_pretty(tree).map_err(|error| {
            ContextError::with_error(ErrorKind::Data, "Unable to serialize the document store", &error)
        })?;
        std::fs::write(&self.tree_path, tree_content).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Io,
                format!("Unable to write the document store {:?}", self.tree_path),
                &error,
            )
        })
    }

    /// Applies the change to the `cvdata` subtree of the user, creating the path as needed.
    fn update_cv_data<F>(&self, user_id: &str, update: F) -> Result<(), ContextError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        check_key(user_id)?;
        let mut tree = self.load_tree()?;
        let cv_data = ["users", user_id, "cvdata"]
            .into_iter()
            .try_fold(&mut tree, |node, key| {
                let children = node.as_object_mut()?;
                let child = children
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !child.is_object() {
                    *child = Value::Object(Map::new());
                }
                Some(child)
            })
            .and_then(Value::as_object_mut)
            .ok_or(ContextError::with_context(
                ErrorKind::Data,
                format!("The document store {:?} is not a JSON object", self.tree_path),
            ))?;

        update(cv_data);
        self.store_tree(&tree)
    }
}

impl CvStore for JsonTreeStore {
    fn fetch_cv(&self, user_id: &str) -> Result<CvDocument, ContextError> {
        check_key(user_id)?;
        let tree = self.load_tree()?;
        match tree.pointer(&format!("/users/{}/cvdata", user_id)) {
            Some(cv_data) => Ok(CvDocument::from_tree(cv_data)),
            None => {
                log::debug!("No CV is stored for {}, starting from a blank one", user_id);
                Ok(CvDocument::default())
            }
        }
    }

    fn save_cv(&self, user_id: &str, document: &CvDocument) -> Result<(), ContextError> {
        let sections = document.to_tree()?;
        self.update_cv_data(user_id, |cv_data| {
            for (section, children) in sections {
                cv_data.insert(section, children);
            }
        })?;
        log::info!("Saved the CV of {}", user_id);

        Ok(())
    }

    fn set_photo_url(&self, user_id: &str, photo_url: &str) -> Result<(), ContextError> {
        self.update_cv_data(user_id, |cv_data| {
            cv_data.insert("image".into(), Value::String(photo_url.to_string()));
        })
    }
}

/// A blob store in a local directory, handing out `file://` URLs.
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore {
    root_directory: PathBuf,
}

const FILE_URL_SCHEME: &str = "file://";

impl DirectoryBlobStore {
    pub fn new<P: Into<PathBuf>>(root_directory: P) -> Self {
        DirectoryBlobStore {
            root_directory: root_directory.into(),
        }
    }
}

impl BlobStore for DirectoryBlobStore {
    fn upload(&self, user_id: &str, payload: &[u8], extension: &str) -> Result<String, ContextError> {
        check_key(user_id)?;
        check_key(extension)?;

        let user_directory = self.root_directory.join("profile_images").join(user_id);
        std::fs::create_dir_all(&user_directory).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Io,
                format!("Unable to create the directory {:?}", user_directory),
                &error,
            )
        })?;
        let blob_path = user_directory.join(format!("{}.{}", random_identifier(16), extension));
        std::fs::write(&blob_path, payload).map_err(|error| {
            ContextError::with_error(ErrorKind::Io, format!("Unable to write the blob {:?}", blob_path), &error)
        })?;

        let absolute_path = blob_path.canonicalize().map_err(|error| {
            ContextError::with_error(ErrorKind::Io, format!("Unable to resolve the blob {:?}", blob_path), &error)
        })?;
        Ok(format!("{}{}", FILE_URL_SCHEME, absolute_path.display()))
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, ContextError> {
        let blob_path = url.strip_prefix(FILE_URL_SCHEME).ok_or(ContextError::with_context(
            ErrorKind::Data,
            format!("Unable to fetch {:?}, only {} URLs are supported", url, FILE_URL_SCHEME),
        ))?;
        let read_error = |error: std::io::Error| {
            ContextError::with_error(ErrorKind::Io, format!("Unable to read the blob {:?}", blob_path), &error)
        };

        // Only the blobs uploaded under the root directory are served
        let root_directory = self.root_directory.canonicalize().map_err(|error| {
            ContextError::with_error(
                ErrorKind::Io,
                format!("Unable to resolve the blob directory {:?}", self.root_directory),
                &error,
            )
        })?;
        let blob_path = Path::new(blob_path).canonicalize().map_err(read_error)?;
        if !blob_path.starts_with(&root_directory) {
            return Err(ContextError::with_context(
                ErrorKind::Data,
                format!("{:?} is not stored in {:?}", blob_path, root_directory),
            ));
        }
        std::fs::read(&blob_path).map_err(read_error)
    }
}

/// Keys are path segments, both in the document tree and in the blob directory.
fn check_key(key: &str) -> Result<(), ContextError> {
    let is_valid = !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '~'])
        && !key.chars().any(char::is_control);
    if is_valid {
        Ok(())
    } else {
        Err(ContextError::with_context(
            ErrorKind::Data,
            format!("{:?} is not a valid key", key),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::{SectionEntry, Skill};

    fn jane_doe() -> CvDocument {
        CvDocument {
            full_name: "Jane Doe".into(),
            email: "jane@x.com".into(),
            skills: vec![Skill::new("Go"), Skill::new("SQL")],
            experience: vec![SectionEntry::new("Acme").with_dates("2019", "2023")],
            ..Default::default()
        }
    }

    #[test]
    fn saved_cv_is_fetched_back() {
        let directory = tempfile::tempdir().unwrap();
        let store = JsonTreeStore::new(directory.path().join("tree.json"));

        store.save_cv("jane", &jane_doe()).unwrap();
        let fetched = store.fetch_cv("jane").unwrap();
        similar_asserts::assert_eq!(fetched, jane_doe());

        let tree: Value = serde_json::from_str(&std::fs::read_to_string(store.tree_path()).unwrap()).unwrap();
        assert_eq!(
            tree.pointer("/users/jane/cvdata/experience/exp1/expName"),
            Some(&Value::from("Acme"))
        );
        assert_eq!(
            tree.pointer("/users/jane/cvdata/skills/skills2/name"),
            Some(&Value::from("SQL"))
        );
    }

    #[test]
    fn unknown_user_gets_a_blank_cv() {
        let directory = tempfile::tempdir().unwrap();
        let store = JsonTreeStore::new(directory.path().join("tree.json"));
        assert!(store.fetch_cv("nobody").unwrap().is_blank());
    }

    #[test]
    fn saving_keeps_the_photo_and_replaces_sections() {
        let directory = tempfile::tempdir().unwrap();
        let store = JsonTreeStore::new(directory.path().join("tree.json"));

        store.set_photo_url("jane", "file:///photo.png").unwrap();
        store.save_cv("jane", &jane_doe()).unwrap();
        let with_fewer_skills = CvDocument {
            skills: vec![Skill::new("Rust")],
            ..jane_doe()
        };
        store.save_cv("jane", &with_fewer_skills).unwrap();

        let fetched = store.fetch_cv("jane").unwrap();
        assert_eq!(fetched.photo_url, "file:///photo.png");
        assert_eq!(fetched.visible_skills().collect::<Vec<_>>(), vec!["Rust"]);
    }

    #[test]
    fn blank_cv_is_not_saved() {
        let directory = tempfile::tempdir().unwrap();
        let store = JsonTreeStore::new(directory.path().join("tree.json"));

        let error = store.save_cv("jane", &CvDocument::default()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::EmptyDocument);
        assert!(!store.tree_path().exists());
    }

    #[test]
    fn keys_cannot_escape_the_tree() {
        let directory = tempfile::tempdir().unwrap();
        let store = JsonTreeStore::new(directory.path().join("tree.json"));
        assert_eq!(store.fetch_cv("../etc").unwrap_err().kind(), ErrorKind::Data);

        let blob_store = DirectoryBlobStore::new(directory.path());
        assert_eq!(blob_store.upload("", b"x", "png").unwrap_err().kind(), ErrorKind::Data);
    }

    #[test]
    fn uploaded_blob_is_fetched_back() {
        let directory = tempfile::tempdir().unwrap();
        let blob_store = DirectoryBlobStore::new(directory.path());

        let url = blob_store.upload("jane", b"not really a png", "png").unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.contains("profile_images"));
        assert!(url.ends_with(".png"));
        assert_eq!(blob_store.fetch(&url).unwrap(), b"not really a png");
        assert_eq!(blob_store.fetch("https://example.com/a.png").unwrap_err().kind(), ErrorKind::Data);
    }

    #[test]
    fn blobs_are_only_fetched_from_their_directory() {
        let directory = tempfile::tempdir().unwrap();
        let outside_file = directory.path().join("tree.json");
        std::fs::write(&outside_file, b"{}").unwrap();
        let blob_store = DirectoryBlobStore::new(directory.path().join("blobs"));
        let url = blob_store.upload("jane", b"x", "png").unwrap();

        assert_eq!(blob_store.fetch(&url).unwrap(), b"x");
        let outside_url = format!("file://{}", outside_file.display());
        assert_eq!(blob_store.fetch(&outside_url).unwrap_err().kind(), ErrorKind::Data);
        let other_store = DirectoryBlobStore::new(directory.path().join("other"));
        std::fs::create_dir(directory.path().join("other")).unwrap();
        assert_eq!(other_store.fetch(&url).unwrap_err().kind(), ErrorKind::Data);
    }

    #[test]
    fn photo_upload_requires_a_user() {
        let directory = tempfile::tempdir().unwrap();
        let store = JsonTreeStore::new(directory.path().join("tree.json"));
        let blob_store = DirectoryBlobStore::new(directory.path());

        let error = upload_profile_photo(&StaticIdentity::signed_out(), &store, &blob_store, b"x", "png")
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unauthenticated);
        assert_eq!(error.to_string(), "Please sign in to save your CV!");

        let url = upload_profile_photo(&StaticIdentity::signed_in("jane"), &store, &blob_store, b"x", "png")
            .unwrap();
        assert_eq!(store.fetch_cv("jane").unwrap().photo_url, url);
    }
}
