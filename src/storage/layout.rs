use crate::core::error::Error;
use std::fs;
use std::path::PathBuf;

/// On-disk directory structure rooted at `base_path`:
///
/// ```text
/// schemas/<db>/<namespace>/
/// index/<db>/<namespace>/<metric>/<location_id>/
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_path: PathBuf,
}

impl StorageLayout {
    pub fn new(base_path: PathBuf) -> Self {
        StorageLayout { base_path }
    }

    pub fn schema_dir(&self, db: &str, namespace: &str) -> PathBuf {
        self.base_path.join("schemas").join(db).join(namespace)
    }

    pub fn schema_file(&self, db: &str, namespace: &str) -> PathBuf {
        self.schema_dir(db, namespace).join("schema.bin")
    }

    pub fn metric_dir(&self, db: &str, namespace: &str, metric: &str) -> PathBuf {
        self.base_path.join("index").join(db).join(namespace).join(metric)
    }

    pub fn location_dir(&self, db: &str, namespace: &str, metric: &str, location_id: &str) -> PathBuf {
        self.base_path
            .join("index")
            .join(db)
            .join(namespace)
            .join(metric)
            .join(location_id)
    }

    pub fn location_file(&self, db: &str, namespace: &str, metric: &str, location_id: &str) -> PathBuf {
        self.location_dir(db, namespace, metric, location_id)
            .join("records.bin")
    }

    pub fn ensure_schema_dir(&self, db: &str, namespace: &str) -> Result<PathBuf, Error> {
        let dir = self.schema_dir(db, namespace);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn ensure_location_dir(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        location_id: &str,
    ) -> Result<PathBuf, Error> {
        let dir = self.location_dir(db, namespace, metric, location_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_file_path_matches_documented_layout() {
        let layout = StorageLayout::new(PathBuf::from("/data"));
        let path = layout.location_file("db", "ns", "temperature", "0_999");
        assert_eq!(
            path,
            PathBuf::from("/data/index/db/ns/temperature/0_999/records.bin")
        );
    }
}
