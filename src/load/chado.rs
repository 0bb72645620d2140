//! Code supporting the `load chado` sub command.

use std::collections::HashMap;

use clap::Parser;
use indicatif::ProgressIterator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::load::{indicatif_style, Loader, RawGene, StoreArgs};
use crate::store::Store;

/// Command line arguments for `load chado` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Load from a Chado (PostgreSQL) database", long_about = None)]
pub struct Args {
    /// Common store arguments.
    #[command(flatten)]
    pub store: StoreArgs,
    /// The PostgreSQL database.
    #[arg(long, env = "POSTGRES_DATABASE", default_value = "chado")]
    pub postgres_database: String,
    /// The PostgreSQL username.
    #[arg(long, env = "POSTGRES_USER", default_value = "chado")]
    pub postgres_user: String,
    /// The PostgreSQL password.
    #[arg(long, env = "POSTGRES_PASSWORD")]
    pub postgres_password: Option<String>,
    /// The PostgreSQL host.
    #[arg(long, env = "POSTGRES_HOST", default_value = "localhost")]
    pub postgres_host: String,
    /// The PostgreSQL port.
    #[arg(long, env = "POSTGRES_PORT", default_value_t = 5432)]
    pub postgres_port: u16,
    /// Use the Chado "uniquename" field instead of "name" for chromosomes
    /// and genes.
    #[arg(long, env = "UNIQUENAME", default_value_t = false)]
    pub uniquename: bool,
}

/// Look up a Chado CV term id by name and, optionally, CV name.
///
/// A missing term is fatal: without it the feature queries cannot be
/// restricted to the right types.
async fn cvterm(pool: &PgPool, name: &str, cv: Option<&str>) -> Result<i32, anyhow::Error> {
    let row = match cv {
        Some(cv) => {
            sqlx::query(
                "SELECT cvterm_id FROM cvterm \
                 WHERE name = $1 AND cv_id = (SELECT cv_id FROM cv WHERE name = $2)",
            )
            .bind(name)
            .bind(cv)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT cvterm_id FROM cvterm WHERE name = $1")
                .bind(name)
                .fetch_optional(pool)
                .await?
        }
    };
    row.map(|r| r.get::<i32, _>("cvterm_id"))
        .ok_or_else(|| anyhow::anyhow!("failed to retrieve the {:?} cvterm entry", name))
}

/// A chromosome feature as read from Chado.
struct ChadoChromosome {
    name: String,
    length: u64,
    genus: String,
    species: String,
}

/// Read the chromosome features of the eligible sequence types.
///
/// Returns a map from Chado feature id to the chromosome.
async fn transfer_chromosomes(
    pool: &PgPool,
    loader: &mut Loader<'_>,
    args: &Args,
) -> Result<HashMap<i32, String>, anyhow::Error> {
    let mut type_ids = Vec::new();
    for sequence_type in &args.store.sequence_types {
        type_ids.push(cvterm(pool, &sequence_type.to_string(), Some("sequence")).await?);
    }

    let mut organisms: HashMap<i32, (String, String)> = HashMap::new();
    let rows = sqlx::query("SELECT organism_id, genus, species FROM organism")
        .fetch_all(pool)
        .await?;
    for row in rows {
        organisms.insert(
            row.get("organism_id"),
            (row.get("genus"), row.get("species")),
        );
    }

    let name_field = if args.uniquename { "uniquename" } else { "name" };
    let query = format!(
        "SELECT feature_id, {name_field} AS name, organism_id, seqlen \
         FROM feature WHERE type_id = ANY($1)"
    );
    let rows = sqlx::query(&query).bind(&type_ids).fetch_all(pool).await?;

    let mut id_to_name = HashMap::new();
    let mut skipped = 0usize;
    for row in rows {
        let feature_id: i32 = row.get("feature_id");
        let name: Option<String> = row.get("name");
        let organism_id: i32 = row.get("organism_id");
        let seqlen: Option<i32> = row.get("seqlen");
        let organism = organisms.get(&organism_id);
        let chromosome = match (name, seqlen, organism) {
            (Some(name), Some(seqlen), Some((genus, species))) if seqlen >= 0 => ChadoChromosome {
                name,
                length: seqlen as u64,
                genus: genus.clone(),
                species: species.clone(),
            },
            _ => {
                skipped += 1;
                continue;
            }
        };
        loader.add_chromosome(
            &chromosome.name,
            chromosome.length,
            &chromosome.genus,
            &chromosome.species,
        )?;
        id_to_name.insert(feature_id, chromosome.name);
    }
    info!("found {} chromosomes", id_to_name.len());
    if skipped > 0 {
        info!("skipped {} chromosomes with incomplete records", skipped);
    }
    Ok(id_to_name)
}

/// Read the gene features, group them by chromosome and hand each group to
/// the loader.
async fn transfer_genes(
    pool: &PgPool,
    loader: &mut Loader<'_>,
    chromosomes: &HashMap<i32, String>,
    args: &Args,
) -> Result<(), anyhow::Error> {
    let gene_type = cvterm(pool, "gene", Some("sequence")).await?;
    let family_type = cvterm(pool, "gene family", None).await?;

    // Family annotations keyed by gene feature id.
    let mut families: HashMap<i32, String> = HashMap::new();
    let rows = sqlx::query("SELECT feature_id, value FROM featureprop WHERE type_id = $1")
        .bind(family_type)
        .fetch_all(pool)
        .await?;
    for row in rows {
        if let Some(value) = row.get::<Option<String>, _>("value") {
            families.insert(row.get("feature_id"), value);
        }
    }

    let name_field = if args.uniquename { "uniquename" } else { "name" };
    let query = format!(
        "SELECT fl.srcfeature_id, f.feature_id, f.{name_field} AS name, \
         fl.fmin, fl.fmax, fl.strand \
         FROM featureloc fl, feature f \
         WHERE fl.feature_id = f.feature_id AND f.type_id = $1"
    );
    let rows = sqlx::query(&query).bind(gene_type).fetch_all(pool).await?;

    let mut chromosome_genes: HashMap<i32, Vec<RawGene>> = HashMap::new();
    let mut skipped_chromosome = 0usize;
    let mut skipped_location = 0usize;
    for row in rows {
        let srcfeature_id: Option<i32> = row.get("srcfeature_id");
        let feature_id: i32 = row.get("feature_id");
        let name: Option<String> = row.get("name");
        let fmin: Option<i32> = row.get("fmin");
        let fmax: Option<i32> = row.get("fmax");
        let strand: Option<i16> = row.get("strand");

        let chromosome_id = match srcfeature_id {
            Some(id) if chromosomes.contains_key(&id) => id,
            _ => {
                // Genes located on something that wasn't loaded are dropped.
                skipped_chromosome += 1;
                continue;
            }
        };
        let (name, fmin, fmax) = match (name, fmin, fmax) {
            (Some(name), Some(fmin), Some(fmax)) if fmin >= 0 && fmax >= fmin => {
                (name, fmin as u64, fmax as u64)
            }
            _ => {
                skipped_location += 1;
                continue;
            }
        };
        chromosome_genes
            .entry(chromosome_id)
            .or_default()
            .push(RawGene {
                family: families.get(&feature_id).cloned().unwrap_or_default(),
                name,
                fmin,
                fmax,
                strand: strand.map(|s| s.clamp(-1, 1) as i8).unwrap_or(0),
            });
    }

    let style = indicatif_style();
    for (chromosome_id, genes) in chromosome_genes.into_iter().progress_with_style(style) {
        let name = &chromosomes[&chromosome_id];
        loader.add_chromosome_genes(name, genes)?;
    }
    if skipped_chromosome > 0 {
        info!(
            "skipped {} genes on chromosomes that were not loaded",
            skipped_chromosome
        );
    }
    if skipped_location > 0 {
        info!("skipped {} genes with incomplete locations", skipped_location);
    }
    Ok(())
}

/// Main entry point for `load chado` sub command.
#[tokio::main]
pub async fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    info!("connecting to PostgreSQL at {}", args.postgres_host);
    let mut options = PgConnectOptions::new()
        .host(&args.postgres_host)
        .port(args.postgres_port)
        .database(&args.postgres_database)
        .username(&args.postgres_user);
    if let Some(password) = &args.postgres_password {
        options = options.password(password);
    }
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    info!("opening store at {}", args.store.path_db);
    let store = Store::open(&args.store.path_db)?;
    let mut loader = Loader::new(&store, args.store.load_type, args.store.chunk_size)?;

    info!("loading chromosomes");
    let chromosomes = transfer_chromosomes(&pool, &mut loader, args).await?;
    info!("loading genes");
    transfer_genes(&pool, &mut loader, &chromosomes, args).await?;

    loader.finish(!args.store.no_save)?;
    Ok(())
}
