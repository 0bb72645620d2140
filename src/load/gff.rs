//! Code supporting the `load gff` sub command.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use clap::Parser;
use indicatif::ProgressIterator;
use tracing::info;

use crate::load::{indicatif_style, Loader, RawGene, StoreArgs};
use crate::store::Store;

/// Command line arguments for `load gff` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Load from GFF and GFA files", long_about = None)]
pub struct Args {
    /// Common store arguments.
    #[command(flatten)]
    pub store: StoreArgs,
    /// The genus of the data being loaded.
    #[arg(long, env = "GENUS", required = true)]
    pub genus: String,
    /// The species of the data being loaded.
    #[arg(long, env = "SPECIES", required = true)]
    pub species: String,
    /// The strain of the data being loaded.
    #[arg(long, env = "STRAIN")]
    pub strain: Option<String>,
    /// Path to the GFF to load chromosomes from; may be gzip-compressed.
    #[arg(long, env = "CHROMOSOME_GFF", required = true)]
    pub chromosome_gff: String,
    /// Path to the GFF to load genes from; may be gzip-compressed.
    #[arg(long, env = "GENE_GFF", required = true)]
    pub gene_gff: String,
    /// Path to the tab-separated gene-family association file; may be
    /// gzip-compressed.
    #[arg(long, env = "GFA", required = true)]
    pub gfa: String,
}

/// Open a file, transparently decompressing `.gz`.
fn open_maybe_gzip<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("could not open {}: {}", path.display(), e))?;
    if path.extension().map_or(false, |ext| ext == "gz") {
        let decoder = flate2::read::MultiGzDecoder::new(file);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One row of a GFF file, reduced to the columns the loader needs.
#[derive(Debug, PartialEq, Eq)]
struct GffRow {
    seqid: String,
    ty: String,
    start: u64,
    end: u64,
    strand: i8,
    id: Option<String>,
}

/// Parse one GFF line; `None` for comments, directives and blank lines.
fn parse_gff_line(line: &str) -> Result<Option<GffRow>, anyhow::Error> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 9 {
        anyhow::bail!("GFF line has {} columns, expected 9: {:?}", fields.len(), line);
    }
    let start: u64 = fields[3]
        .parse()
        .map_err(|e| anyhow::anyhow!("bad GFF start {:?}: {}", fields[3], e))?;
    let end: u64 = fields[4]
        .parse()
        .map_err(|e| anyhow::anyhow!("bad GFF end {:?}: {}", fields[4], e))?;
    let strand = match fields[6] {
        "+" => 1,
        "-" => -1,
        _ => 0,
    };
    let id = fields[8].split(';').find_map(|attribute| {
        attribute
            .trim()
            .strip_prefix("ID=")
            .map(|value| value.to_string())
    });
    Ok(Some(GffRow {
        seqid: fields[0].to_string(),
        ty: fields[2].to_string(),
        start,
        end,
        strand,
        id,
    }))
}

/// Read the chromosomes from the chromosome GFF and register them with the
/// loader. Returns the names of the loaded chromosomes.
fn transfer_chromosomes(
    loader: &mut Loader<'_>,
    args: &Args,
    species: &str,
) -> Result<HashSet<String>, anyhow::Error> {
    let eligible: HashSet<String> = args
        .store
        .sequence_types
        .iter()
        .map(|t| t.to_string())
        .collect();
    let mut names = HashSet::new();
    let reader = open_maybe_gzip(&args.chromosome_gff)?;
    for line in reader.lines() {
        let line = line?;
        let Some(row) = parse_gff_line(&line)? else {
            continue;
        };
        if !eligible.contains(&row.ty) {
            continue;
        }
        loader.add_chromosome(&row.seqid, row.end, &args.genus, species)?;
        names.insert(row.seqid);
    }
    info!("found {} chromosomes", names.len());
    Ok(names)
}

/// Read the genes from the gene GFF, attach family assignments from the GFA
/// file, and hand each chromosome's genes to the loader.
fn transfer_genes(
    loader: &mut Loader<'_>,
    args: &Args,
    chromosome_names: &HashSet<String>,
) -> Result<(), anyhow::Error> {
    // Gene positions keyed by (chromosome, offset within its gene list) so
    // family assignments can be patched in before indexing.
    let mut chromosome_genes: HashMap<String, Vec<RawGene>> = HashMap::new();
    let mut gene_positions: HashMap<String, (String, usize)> = HashMap::new();
    let mut skipped_chromosome = 0usize;
    let mut skipped_nameless = 0usize;

    let reader = open_maybe_gzip(&args.gene_gff)?;
    for line in reader.lines() {
        let line = line?;
        let Some(row) = parse_gff_line(&line)? else {
            continue;
        };
        if row.ty != "gene" {
            continue;
        }
        if !chromosome_names.contains(&row.seqid) {
            // Genes located on something that wasn't loaded are dropped.
            skipped_chromosome += 1;
            continue;
        }
        let Some(name) = row.id else {
            skipped_nameless += 1;
            continue;
        };
        let genes = chromosome_genes.entry(row.seqid.clone()).or_default();
        gene_positions.insert(name.clone(), (row.seqid, genes.len()));
        genes.push(RawGene {
            name,
            fmin: row.start,
            fmax: row.end,
            strand: row.strand,
            family: String::new(),
        });
    }

    // Family assignments for non-orphans come from the GFA file.
    let mut skipped_family = 0usize;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(open_maybe_gzip(&args.gfa)?);
    for record in reader.records() {
        let record = record?;
        let (Some(gene), Some(family)) = (record.get(0), record.get(1)) else {
            continue;
        };
        // Metadata rows some association files carry.
        if gene == "ScoreMeaning" {
            continue;
        }
        match gene_positions.get(gene) {
            Some((chromosome, offset)) => {
                chromosome_genes
                    .get_mut(chromosome)
                    .expect("chromosome of positioned gene")[*offset]
                    .family = family.to_string();
            }
            None => {
                // Entries for genes the gene GFF did not provide are dropped.
                skipped_family += 1;
            }
        }
    }

    let style = indicatif_style();
    for (chromosome, genes) in chromosome_genes.into_iter().progress_with_style(style) {
        loader.add_chromosome_genes(&chromosome, genes)?;
    }
    if skipped_chromosome > 0 {
        info!(
            "skipped {} genes on chromosomes that were not loaded",
            skipped_chromosome
        );
    }
    if skipped_nameless > 0 {
        info!("skipped {} genes without an ID attribute", skipped_nameless);
    }
    if skipped_family > 0 {
        info!(
            "skipped {} family assignments for unknown genes",
            skipped_family
        );
    }
    Ok(())
}

/// Main entry point for `load gff` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    // The strain is carried in the species string after a separator.
    let species = match &args.strain {
        Some(strain) => format!("{}:{}", args.species, strain),
        None => args.species.clone(),
    };

    info!("opening store at {}", args.store.path_db);
    let store = Store::open(&args.store.path_db)?;
    let mut loader = Loader::new(&store, args.store.load_type, args.store.chunk_size)?;

    info!("loading chromosomes from {}", args.chromosome_gff);
    let chromosome_names = transfer_chromosomes(&mut loader, args, &species)?;
    info!("loading genes from {}", args.gene_gff);
    transfer_genes(&mut loader, args, &chromosome_names)?;

    loader.finish(!args.store.no_save)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::{parse_gff_line, Args, GffRow};
    use crate::load::StoreArgs;
    use crate::store::Store;

    #[rstest::rstest]
    #[case("# a comment", None)]
    #[case("", None)]
    #[case(
        "glyma.Chr01\tphytozome\tchromosome\t1\t56831624\t.\t.\t.\tID=glyma.Chr01",
        Some(GffRow {
            seqid: "glyma.Chr01".into(),
            ty: "chromosome".into(),
            start: 1,
            end: 56_831_624,
            strand: 0,
            id: Some("glyma.Chr01".into()),
        })
    )]
    #[case(
        "glyma.Chr01\tphytozome\tgene\t1000\t2000\t.\t-\t.\tID=glyma.g1;Name=g1",
        Some(GffRow {
            seqid: "glyma.Chr01".into(),
            ty: "gene".into(),
            start: 1_000,
            end: 2_000,
            strand: -1,
            id: Some("glyma.g1".into()),
        })
    )]
    fn gff_line(#[case] line: &str, #[case] expected: Option<GffRow>) {
        assert_eq!(expected, parse_gff_line(line).unwrap());
    }

    #[test]
    fn gff_line_rejects_short_rows() {
        assert!(parse_gff_line("glyma.Chr01\tgene\t1\t2").is_err());
    }

    fn write_fixture(dir: &std::path::Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn load_from_gff_roundtrip() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let chromosome_gff = write_fixture(
            tmp_dir.path(),
            "chromosomes.gff3",
            "##gff-version 3\n\
             glyma.Chr01\tassembly\tchromosome\t1\t1000000\t.\t.\t.\tID=glyma.Chr01\n\
             glyma.sc42\tassembly\tsupercontig\t1\t5000\t.\t.\t.\tID=glyma.sc42\n",
        );
        let gene_gff = write_fixture(
            tmp_dir.path(),
            "genes.gff3",
            "##gff-version 3\n\
             glyma.Chr01\tphytozome\tgene\t1000\t2000\t.\t+\t.\tID=glyma.g1\n\
             glyma.Chr01\tphytozome\tgene\t3000\t4000\t.\t-\t.\tID=glyma.g2\n\
             glyma.Chr01\tphytozome\tmRNA\t1000\t2000\t.\t+\t.\tID=glyma.g1.mrna1\n\
             glyma.sc42\tphytozome\tgene\t10\t20\t.\t+\t.\tID=glyma.sc42.g1\n",
        );
        let gfa = write_fixture(
            tmp_dir.path(),
            "families.tsv",
            "#gene\tfamily\n\
             ScoreMeaning\te-value\n\
             glyma.g1\tfam.A\n\
             glyma.g9\tfam.B\n",
        );

        let store_dir = tmp_dir.path().join("db");
        let args = Args {
            store: StoreArgs {
                path_db: store_dir.to_str().unwrap().to_string(),
                chunk_size: 100,
                load_type: crate::load::LoadType::New,
                sequence_types: vec![crate::load::SequenceType::Chromosome],
                no_save: false,
            },
            genus: "Glycine".into(),
            species: "max".into(),
            strain: Some("Williams82".into()),
            chromosome_gff,
            gene_gff,
            gfa,
        };
        super::run(&Default::default(), &args).unwrap();

        let store = Store::open_read_only(&store_dir).unwrap();
        let record = store.chromosome("glyma.Chr01").unwrap().unwrap();
        assert_eq!(1_000_000, record.length);
        assert_eq!("max:Williams82", record.species);
        // The supercontig was not among the eligible sequence types.
        assert!(store.chromosome("glyma.sc42").unwrap().is_none());

        let families = store.chromosome_families("glyma.Chr01").unwrap().unwrap();
        assert_eq!(vec!["fam.A", ""], families);
        let gene = store.gene("glyma.g2").unwrap().unwrap();
        assert_eq!(-1, gene.strand);
        assert_eq!(1, gene.index);
    }
}
