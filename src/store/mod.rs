//! Access to the backing store.
//!
//! The store is an embedded RocksDB database. The loader is the sole writer;
//! the query services open it read-only and treat it as the source of truth,
//! building transient value objects per request rather than object graphs.

pub mod index;
pub mod schema;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use rocksdb::{BoundColumnFamily, DBWithThreadMode, MultiThreaded};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::err::ServiceError;
use crate::store::schema::{
    ChromosomeRecord, GeneRecord, CF_CHROMOSOMES, CF_CHROMOSOME_FAMILIES, CF_CHROMOSOME_FMAXS,
    CF_CHROMOSOME_FMINS, CF_CHROMOSOME_GENES, CF_GENES, CF_GENES_BY_FAMILY, CF_META,
    COMPATIBLE_SCHEMA_VERSIONS, KEY_SCHEMA_VERSION,
};

/// RocksDB database type used throughout the crate.
pub type Db = DBWithThreadMode<MultiThreaded>;

/// Handle to an open store.
pub struct Store {
    db: Db,
}

/// Construct RocksDB options for opening the store.
fn build_options() -> rocksdb::Options {
    let mut options = rocksdb::Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    options
}

impl Store {
    /// Open the store read-write, creating it and any missing column
    /// families as needed. Used by the loader.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let options = build_options();
        let db = Db::open_cf(&options, path, schema::ALL_CFS)?;
        Ok(Self { db })
    }

    /// Open the store read-only. Used by the query services.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let options = rocksdb::Options::default();
        let db = Db::open_cf_for_read_only(&options, path, schema::ALL_CFS, false)?;
        Ok(Self { db })
    }

    /// Access the underlying database, e.g. for batched writes.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Resolve a column family handle.
    pub fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>, ServiceError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow::anyhow!("column family {:?} is missing", name).into())
    }

    /// Read a JSON-encoded value.
    fn get_json<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &str,
    ) -> Result<Option<T>, ServiceError> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write a JSON-encoded value into a batch.
    pub fn batch_put_json<T: Serialize>(
        &self,
        batch: &mut rocksdb::WriteBatch,
        cf_name: &str,
        key: &str,
        value: &T,
    ) -> Result<(), ServiceError> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(&cf, key.as_bytes(), serde_json::to_vec(value)?);
        Ok(())
    }

    /// Read the schema version of the loaded data, if any.
    pub fn schema_version(&self) -> Result<Option<String>, ServiceError> {
        let cf = self.cf(CF_META)?;
        Ok(self
            .db
            .get_cf(&cf, KEY_SCHEMA_VERSION.as_bytes())?
            .map(|raw| String::from_utf8_lossy(&raw).into_owned()))
    }

    /// Verify the stored schema version is one this crate can serve from.
    ///
    /// Fatal at service startup when the version is absent or incompatible.
    pub fn check_schema_version(&self) -> Result<(), ServiceError> {
        match self.schema_version()? {
            Some(version) if COMPATIBLE_SCHEMA_VERSIONS.contains(&version.as_str()) => Ok(()),
            Some(version) => Err(ServiceError::SchemaVersionMismatch(format!(
                "store has schema version {} but this worker supports {:?}",
                version, COMPATIBLE_SCHEMA_VERSIONS
            ))),
            None => Err(ServiceError::SchemaVersionMismatch(
                "store has no schema version; run the loader first".to_string(),
            )),
        }
    }

    /// Fetch a chromosome record by name.
    pub fn chromosome(&self, name: &str) -> Result<Option<ChromosomeRecord>, ServiceError> {
        self.get_json(CF_CHROMOSOMES, name)
    }

    /// Fetch a chromosome's ordered gene name sequence.
    pub fn chromosome_genes(&self, name: &str) -> Result<Option<Vec<String>>, ServiceError> {
        self.get_json(CF_CHROMOSOME_GENES, name)
    }

    /// Fetch a chromosome's ordered family sequence.
    pub fn chromosome_families(&self, name: &str) -> Result<Option<Vec<String>>, ServiceError> {
        self.get_json(CF_CHROMOSOME_FAMILIES, name)
    }

    /// Fetch a chromosome's ordered `fmin` sequence.
    pub fn chromosome_fmins(&self, name: &str) -> Result<Option<Vec<u64>>, ServiceError> {
        self.get_json(CF_CHROMOSOME_FMINS, name)
    }

    /// Fetch a chromosome's ordered `fmax` sequence.
    pub fn chromosome_fmaxs(&self, name: &str) -> Result<Option<Vec<u64>>, ServiceError> {
        self.get_json(CF_CHROMOSOME_FMAXS, name)
    }

    /// Fetch a gene record by name.
    pub fn gene(&self, name: &str) -> Result<Option<GeneRecord>, ServiceError> {
        self.get_json(CF_GENES, name)
    }

    /// Collect the `(chromosome, index)` pairs of every gene in a family,
    /// optionally restricted to a set of chromosomes.
    ///
    /// Pairs come out grouped by chromosome with indices ascending, the
    /// iteration order of the `genes_by_family` keys.
    pub fn family_members(
        &self,
        family: &str,
        targets: Option<&HashSet<String>>,
    ) -> Result<Vec<(String, usize)>, ServiceError> {
        let cf = self.cf(CF_GENES_BY_FAMILY)?;
        let prefix = schema::family_index_prefix(family);
        let mut members = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            rocksdb::IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for entry in iter {
            let (key, _) = entry?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some((chromosome, index)) = schema::decode_family_index_key(prefix.len(), &key) {
                if targets.map_or(true, |t| t.contains(chromosome)) {
                    members.push((chromosome.to_string(), index));
                }
            }
        }
        Ok(members)
    }
}


#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::test_support::{populate, two_chromosome_fixtures};

    #[test]
    fn chromosome_roundtrip() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());

        let record = store.chromosome("glyma.Chr01").unwrap().unwrap();
        assert_eq!("glyma.Chr01", record.name);
        assert_eq!(56_831_624, record.length);
        assert_eq!("Glycine", record.genus);
        assert_eq!("max", record.species);

        let genes = store.chromosome_genes("glyma.Chr01").unwrap().unwrap();
        let families = store.chromosome_families("glyma.Chr01").unwrap().unwrap();
        let fmins = store.chromosome_fmins("glyma.Chr01").unwrap().unwrap();
        let fmaxs = store.chromosome_fmaxs("glyma.Chr01").unwrap().unwrap();
        assert_eq!(genes.len(), families.len());
        assert_eq!(genes.len(), fmins.len());
        assert_eq!(genes.len(), fmaxs.len());
        assert_eq!(5, genes.len());
        assert_eq!(vec!["fam.A", "fam.B", "fam.C", "", "fam.D"], families);

        assert!(store.chromosome("glyma.Chr99").unwrap().is_none());
    }

    #[test]
    fn gene_records_agree_with_sequences() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());

        let genes = store.chromosome_genes("phavu.Chr02").unwrap().unwrap();
        let families = store.chromosome_families("phavu.Chr02").unwrap().unwrap();
        let fmins = store.chromosome_fmins("phavu.Chr02").unwrap().unwrap();
        let fmaxs = store.chromosome_fmaxs("phavu.Chr02").unwrap().unwrap();
        for (i, name) in genes.iter().enumerate() {
            let record = store.gene(name).unwrap().unwrap();
            assert_eq!(i, record.index);
            assert_eq!("phavu.Chr02", record.chromosome);
            assert_eq!(families[i], record.family);
            assert_eq!(fmins[i], record.fmin);
            assert_eq!(fmaxs[i], record.fmax);
        }
        // Genes are sorted by fmin.
        assert!(fmins.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn family_members_grouped_and_sorted() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());

        let members = store.family_members("fam.C", None).unwrap();
        assert_eq!(
            vec![("glyma.Chr01".to_string(), 2), ("phavu.Chr02".to_string(), 1)],
            members
        );

        let targets = std::collections::HashSet::from(["phavu.Chr02".to_string()]);
        let members = store.family_members("fam.C", Some(&targets)).unwrap();
        assert_eq!(vec![("phavu.Chr02".to_string(), 1)], members);
    }

    #[test]
    fn schema_version_is_stamped() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = populate(tmp_dir.path(), &two_chromosome_fixtures());
        assert_eq!(
            Some(super::schema::SCHEMA_VERSION.to_string()),
            store.schema_version().unwrap()
        );
        store.check_schema_version().unwrap();
    }

    #[test]
    fn services_refuse_unversioned_store() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = super::Store::open(tmp_dir.path()).unwrap();
        assert!(matches!(
            store.check_schema_version(),
            Err(crate::err::ServiceError::SchemaVersionMismatch(_))
        ));
    }

    #[test]
    fn services_refuse_incompatible_schema_version() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let store = super::Store::open(tmp_dir.path()).unwrap();
        let cf = store.cf(super::schema::CF_META).unwrap();
        store
            .db()
            .put_cf(&cf, super::schema::KEY_SCHEMA_VERSION, "1.0.0")
            .unwrap();
        assert!(matches!(
            store.check_schema_version(),
            Err(crate::err::ServiceError::SchemaVersionMismatch(_))
        ));
    }
}
