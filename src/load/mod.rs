//! Code supporting the `load *` sub commands.
//!
//! The loader is the sole writer of the store. Both sources (Chado and
//! GFF+GFA) funnel through [`Loader`], which batches writes and commits each
//! chromosome's record only after its gene records and parallel sequences,
//! so readers never observe an indexed chromosome without its sequences.

pub mod chado;
pub mod gff;

use std::collections::HashMap;
use std::fmt::Write as _;

use indicatif::ProgressState;
use tracing::info;

use crate::err::ServiceError;
use crate::store::schema::{
    self, ChromosomeRecord, GeneRecord, CF_CHROMOSOMES, CF_CHROMOSOME_FAMILIES,
    CF_CHROMOSOME_FMAXS, CF_CHROMOSOME_FMINS, CF_CHROMOSOME_GENES, CF_CHROMOSOME_NAME_TOKENS,
    CF_GENES, CF_GENES_BY_FAMILY, CF_GENE_NAME_TOKENS, CF_META, KEY_COMPATIBLE_SCHEMA_VERSIONS,
    KEY_SCHEMA_VERSION,
};
use crate::store::{index, Store};

/// Collision policy against preexisting data in the store.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum LoadType {
    /// Fail if the store already holds data.
    #[default]
    New,
    /// Drop existing data before loading.
    Reload,
    /// Add to existing data; schema versions must agree.
    Append,
}

/// Sequence types eligible for loading as chromosomes.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum SequenceType {
    /// Full nuclear chromosomes.
    #[default]
    Chromosome,
    /// Scaffolds and contigs.
    Supercontig,
    /// Chloroplast organelle.
    Chloroplast,
    /// Mitochondrial organelle.
    Mitochondrion,
}

/// Command line arguments shared by all `load *` sub commands.
#[derive(clap::Parser, Debug)]
pub struct StoreArgs {
    /// Path to the RocksDB store to load into.
    #[arg(long, env = "STORE_PATH", required = true)]
    pub path_db: String,
    /// Number of records per write batch.
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 100)]
    pub chunk_size: usize,
    /// How to treat preexisting data in the store.
    #[arg(long, env = "LOAD_TYPE", value_enum, default_value_t = LoadType::New)]
    pub load_type: LoadType,
    /// Sequence types to load chromosomes for.
    #[arg(
        long,
        env = "SEQUENCE_TYPES",
        value_enum,
        value_delimiter = ',',
        default_values_t = vec![SequenceType::Chromosome]
    )]
    pub sequence_types: Vec<SequenceType>,
    /// Don't flush the store to disk after loading.
    #[arg(long, env = "NO_SAVE", default_value_t = false)]
    pub no_save: bool,
}

/// A gene as read from a source, before ordering and index assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGene {
    /// Gene name.
    pub name: String,
    /// Smallest coordinate on the chromosome.
    pub fmin: u64,
    /// Largest coordinate on the chromosome.
    pub fmax: u64,
    /// Strand: -1, 0 or +1.
    pub strand: i8,
    /// Family identifier; empty when unassigned.
    pub family: String,
}

/// Batched writer for populating the store.
pub struct Loader<'a> {
    store: &'a Store,
    chunk_size: usize,
    /// Chromosome records not yet committed; a record is committed together
    /// with (after) its gene sequences, or at `finish` if it has no genes.
    pending_chromosomes: HashMap<String, ChromosomeRecord>,
    chromosomes_written: usize,
    genes_written: usize,
}

impl<'a> Loader<'a> {
    /// Apply the load-type policy and prepare the store for writing.
    pub fn new(
        store: &'a Store,
        load_type: LoadType,
        chunk_size: usize,
    ) -> Result<Self, anyhow::Error> {
        match load_type {
            LoadType::New => {
                if store.schema_version()?.is_some() || !Self::is_empty(store)? {
                    anyhow::bail!(
                        "the store already holds data but load type \"new\" does not \
                         support preexisting data"
                    );
                }
            }
            LoadType::Reload => {
                info!("dropping existing data");
                for cf_name in schema::DATA_CFS {
                    store.db().drop_cf(cf_name)?;
                    store
                        .db()
                        .create_cf(*cf_name, &rocksdb::Options::default())?;
                }
            }
            LoadType::Append => {
                if let Some(version) = store.schema_version()? {
                    if version != schema::SCHEMA_VERSION {
                        return Err(ServiceError::SchemaVersionMismatch(format!(
                            "the store has schema version {} but this loader writes version {}",
                            version,
                            schema::SCHEMA_VERSION
                        ))
                        .into());
                    }
                }
            }
        }

        // Stamp the schema version and the compatible version set.
        let cf_meta = store.cf(CF_META)?;
        let mut batch = rocksdb::WriteBatch::default();
        batch.put_cf(&cf_meta, KEY_SCHEMA_VERSION, schema::SCHEMA_VERSION);
        batch.put_cf(
            &cf_meta,
            KEY_COMPATIBLE_SCHEMA_VERSIONS,
            serde_json::to_vec(schema::COMPATIBLE_SCHEMA_VERSIONS)?,
        );
        store.db().write(batch)?;

        Ok(Self {
            store,
            chunk_size: chunk_size.max(1),
            pending_chromosomes: HashMap::new(),
            chromosomes_written: 0,
            genes_written: 0,
        })
    }

    fn is_empty(store: &Store) -> Result<bool, anyhow::Error> {
        let cf = store.cf(CF_CHROMOSOMES)?;
        Ok(store
            .db()
            .iterator_cf(&cf, rocksdb::IteratorMode::Start)
            .next()
            .is_none())
    }

    /// Register a chromosome for loading.
    ///
    /// The record is committed with the chromosome's gene sequences, or at
    /// [`Loader::finish`] if no genes arrive for it.
    pub fn add_chromosome(
        &mut self,
        name: &str,
        length: u64,
        genus: &str,
        species: &str,
    ) -> Result<(), ServiceError> {
        self.pending_chromosomes.insert(
            name.to_string(),
            ChromosomeRecord {
                name: name.to_string(),
                length,
                genus: genus.to_string(),
                species: species.to_string(),
            },
        );
        Ok(())
    }

    /// Write a chromosome's genes: the gene records, the search index
    /// entries, the four parallel sequences, and finally the chromosome
    /// record itself.
    pub fn add_chromosome_genes(
        &mut self,
        chromosome: &str,
        mut genes: Vec<RawGene>,
    ) -> Result<(), ServiceError> {
        let record = self
            .pending_chromosomes
            .remove(chromosome)
            .ok_or_else(|| anyhow::anyhow!("genes arrived for unknown chromosome {chromosome}"))?;

        // The gene order and index are defined by fmin.
        genes.sort_by_key(|gene| gene.fmin);

        let cf_genes = self.store.cf(CF_GENES)?;
        let cf_by_family = self.store.cf(CF_GENES_BY_FAMILY)?;
        let cf_gene_tokens = self.store.cf(CF_GENE_NAME_TOKENS)?;

        let mut batch = rocksdb::WriteBatch::default();
        let mut in_batch = 0;
        for (i, gene) in genes.iter().enumerate() {
            let record = GeneRecord {
                name: gene.name.clone(),
                chromosome: chromosome.to_string(),
                fmin: gene.fmin,
                fmax: gene.fmax,
                strand: gene.strand,
                family: gene.family.clone(),
                index: i,
            };
            batch.put_cf(&cf_genes, gene.name.as_bytes(), serde_json::to_vec(&record)?);
            if gene.family != schema::NO_FAMILY {
                batch.put_cf(
                    &cf_by_family,
                    schema::family_index_key(&gene.family, chromosome, i),
                    gene.name.as_bytes(),
                );
            }
            for key in index::token_keys(&gene.name) {
                batch.put_cf(&cf_gene_tokens, key, b"");
            }
            in_batch += 1;
            if in_batch >= self.chunk_size {
                self.store.db().write(std::mem::take(&mut batch))?;
                in_batch = 0;
            }
        }

        // Final batch: parallel sequences, then the chromosome record, so
        // the chromosome only becomes visible complete.
        let names: Vec<&str> = genes.iter().map(|g| g.name.as_str()).collect();
        let families: Vec<&str> = genes.iter().map(|g| g.family.as_str()).collect();
        let fmins: Vec<u64> = genes.iter().map(|g| g.fmin).collect();
        let fmaxs: Vec<u64> = genes.iter().map(|g| g.fmax).collect();
        self.store
            .batch_put_json(&mut batch, CF_CHROMOSOME_GENES, chromosome, &names)?;
        self.store
            .batch_put_json(&mut batch, CF_CHROMOSOME_FAMILIES, chromosome, &families)?;
        self.store
            .batch_put_json(&mut batch, CF_CHROMOSOME_FMINS, chromosome, &fmins)?;
        self.store
            .batch_put_json(&mut batch, CF_CHROMOSOME_FMAXS, chromosome, &fmaxs)?;
        self.write_chromosome_record(&mut batch, &record)?;
        self.store.db().write(batch)?;

        self.chromosomes_written += 1;
        self.genes_written += genes.len();
        Ok(())
    }

    fn write_chromosome_record(
        &self,
        batch: &mut rocksdb::WriteBatch,
        record: &ChromosomeRecord,
    ) -> Result<(), ServiceError> {
        let cf_tokens = self.store.cf(CF_CHROMOSOME_NAME_TOKENS)?;
        self.store
            .batch_put_json(batch, CF_CHROMOSOMES, &record.name, record)?;
        for key in index::token_keys(&record.name) {
            batch.put_cf(&cf_tokens, key, b"");
        }
        Ok(())
    }

    /// Commit chromosomes that received no genes and optionally flush the
    /// store to disk.
    pub fn finish(mut self, save: bool) -> Result<(), anyhow::Error> {
        if !self.pending_chromosomes.is_empty() {
            let mut batch = rocksdb::WriteBatch::default();
            let mut names: Vec<String> = self.pending_chromosomes.keys().cloned().collect();
            names.sort();
            for name in names {
                let record = self
                    .pending_chromosomes
                    .remove(&name)
                    .expect("pending chromosome");
                self.write_chromosome_record(&mut batch, &record)?;

                // An indexed chromosome always has its four sequences, even
                // when they are empty.
                let empty_names: Vec<&str> = Vec::new();
                let empty_coords: Vec<u64> = Vec::new();
                self.store
                    .batch_put_json(&mut batch, CF_CHROMOSOME_GENES, &record.name, &empty_names)?;
                self.store.batch_put_json(
                    &mut batch,
                    CF_CHROMOSOME_FAMILIES,
                    &record.name,
                    &empty_names,
                )?;
                self.store.batch_put_json(
                    &mut batch,
                    CF_CHROMOSOME_FMINS,
                    &record.name,
                    &empty_coords,
                )?;
                self.store.batch_put_json(
                    &mut batch,
                    CF_CHROMOSOME_FMAXS,
                    &record.name,
                    &empty_coords,
                )?;
                self.chromosomes_written += 1;
            }
            self.store.db().write(batch)?;
        }

        info!(
            "loaded {} chromosomes and {} genes",
            self.chromosomes_written, self.genes_written
        );
        if save {
            self.store.db().flush()?;
        }
        Ok(())
    }
}

/// Progress bar style shared by the loaders.
pub fn indicatif_style() -> indicatif::ProgressStyle {
    indicatif::ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {human_pos}/{human_len} ({eta})",
    )
    .unwrap()
    .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
        write!(w, "{:.1}s", state.eta().as_secs_f64()).unwrap()
    })
    .progress_chars("#>-")
}
