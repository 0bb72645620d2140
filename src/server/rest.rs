//! Implementation of the actix server.

use actix_web::middleware::Logger;
use actix_web::web::{self, Data, Json};
use actix_web::{get, post, App, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};

use crate::err::{ErrorBody, ServiceError};
use crate::lookup;
use crate::search as federated_search;
use crate::server::{Args, WebServerData};
use crate::synteny::{blocks, micro, paf, pairwise};

/// Parameters for `get_chromosome`.
#[derive(Deserialize, Debug)]
struct ChromosomeRequest {
    chromosome: String,
}

/// Result type of "/chromosome".
#[derive(Serialize, Debug)]
struct ChromosomeResponse {
    chromosome: lookup::chromosome::Chromosome,
}

/// Fetch one chromosome with its gene and family sequences.
#[post("/chromosome")]
async fn get_chromosome(
    data: Data<WebServerData>,
    request: Json<ChromosomeRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let chromosome = lookup::chromosome::get(&data.store, &request.chromosome)?;
    Ok(Json(ChromosomeResponse { chromosome }))
}

/// Parameters for the name searches and the federated search.
#[derive(Deserialize, Debug)]
struct QueryRequest {
    query: String,
}

/// Result type of "/chromosome-search".
#[derive(Serialize, Debug)]
struct ChromosomeSearchResponse {
    chromosomes: Vec<String>,
}

/// Fuzzy-match chromosome names.
#[post("/chromosome-search")]
async fn search_chromosomes(
    data: Data<WebServerData>,
    request: Json<QueryRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let chromosomes = lookup::search::chromosomes(&data.store, &request.query)?;
    Ok(Json(ChromosomeSearchResponse { chromosomes }))
}

/// Parameters for `get_region`.
#[derive(Deserialize, Debug)]
struct RegionRequest {
    chromosome: String,
    start: u64,
    stop: u64,
}

/// Result type of "/chromosome-region".
#[derive(Serialize, Debug)]
struct RegionResponse {
    region: lookup::region::Region,
}

/// Locate the center gene of a chromosome interval.
#[post("/chromosome-region")]
async fn get_region(
    data: Data<WebServerData>,
    request: Json<RegionRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    if request.start > request.stop {
        return Err(ServiceError::invalid("start must not exceed stop"));
    }
    let region =
        lookup::region::get(&data.store, &request.chromosome, request.start, request.stop)?;
    Ok(Json(RegionResponse { region }))
}

/// Result type of "/gene-search".
#[derive(Serialize, Debug)]
struct GeneSearchResponse {
    genes: Vec<String>,
}

/// Fuzzy-match gene names.
#[post("/gene-search")]
async fn search_genes(
    data: Data<WebServerData>,
    request: Json<QueryRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let genes = lookup::search::genes(&data.store, &request.query)?;
    Ok(Json(GeneSearchResponse { genes }))
}

/// Parameters for `get_genes`.
#[derive(Deserialize, Debug)]
struct GenesRequest {
    genes: Vec<String>,
}

/// Result type of "/genes".
#[derive(Serialize, Debug)]
struct GenesResponse {
    genes: Vec<lookup::genes::Gene>,
}

/// Fetch full records for a list of gene names; misses are omitted.
#[post("/genes")]
async fn get_genes(
    data: Data<WebServerData>,
    request: Json<GenesRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let genes = lookup::genes::get(&data.store, &request.genes)?;
    Ok(Json(GenesResponse { genes }))
}

/// Parameters for `micro_synteny_search`.
#[derive(Deserialize, Debug)]
struct MicroSearchRequest {
    query: Vec<String>,
    matched: f64,
    intermediate: f64,
}

/// Result type of "/micro-synteny-search".
#[derive(Serialize, Debug)]
struct MicroSearchResponse {
    tracks: Vec<micro::Track>,
}

/// Find colinear gene-family runs across all chromosomes.
#[post("/micro-synteny-search")]
async fn micro_synteny_search(
    data: Data<WebServerData>,
    request: Json<MicroSearchRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let thresholds = micro::Thresholds::new(request.matched, request.intermediate)?;
    let tracks = micro::search(&data.store, &request.query, &thresholds)?;
    Ok(Json(MicroSearchResponse { tracks }))
}

/// Parameters for `pairwise_macro_synteny_blocks`.
#[derive(Deserialize, Debug)]
struct PairwiseBlocksRequest {
    chromosome: Vec<String>,
    target: String,
    matched: i64,
    intermediate: i64,
    #[serde(default)]
    mask: Option<i64>,
    #[serde(default, rename = "optionalMetrics")]
    optional_metrics: Vec<String>,
    #[serde(default, rename = "chromosomeGenes")]
    chromosome_genes: Option<i64>,
    #[serde(default, rename = "chromosomeLength")]
    chromosome_length: Option<i64>,
}

impl PairwiseBlocksRequest {
    fn params(&self) -> Result<pairwise::Params, ServiceError> {
        pairwise::Params::try_new(
            self.matched,
            self.intermediate,
            self.mask,
            &self.optional_metrics,
            self.chromosome_genes,
            self.chromosome_length,
        )
    }
}

/// Result type of "/pairwise-macro-synteny-blocks".
#[derive(Serialize, Debug)]
struct PairwiseBlocksResponse {
    blocks: Vec<pairwise::Block>,
}

/// Compute the blocks of a query chromosome against one target.
#[post("/pairwise-macro-synteny-blocks")]
async fn pairwise_macro_synteny_blocks(
    data: Data<WebServerData>,
    request: Json<PairwiseBlocksRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let params = request.params()?;
    let blocks = pairwise::compute(&data.store, &request.chromosome, &request.target, &params)?
        .ok_or(ServiceError::NotFound)?;
    Ok(Json(PairwiseBlocksResponse { blocks }))
}

/// Parameters for `macro_synteny_blocks`.
#[derive(Deserialize, Debug)]
struct MacroBlocksRequest {
    chromosome: Vec<String>,
    matched: i64,
    intermediate: i64,
    #[serde(default)]
    mask: Option<i64>,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default, rename = "optionalMetrics")]
    optional_metrics: Vec<String>,
    #[serde(default, rename = "chromosomeGenes")]
    chromosome_genes: Option<i64>,
    #[serde(default, rename = "chromosomeLength")]
    chromosome_length: Option<i64>,
}

/// Result type of "/macro-synteny-blocks".
#[derive(Serialize, Debug)]
struct MacroBlocksResponse {
    blocks: Vec<blocks::ChromosomeBlocks>,
}

/// Compute macro-synteny blocks against every candidate target.
#[post("/macro-synteny-blocks")]
async fn macro_synteny_blocks(
    data: Data<WebServerData>,
    request: Json<MacroBlocksRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let params = pairwise::Params::try_new(
        request.matched,
        request.intermediate,
        request.mask,
        &request.optional_metrics,
        request.chromosome_genes,
        request.chromosome_length,
    )?;
    let request = request.into_inner();
    let blocks = blocks::compute(
        data.store.clone(),
        std::sync::Arc::new(request.chromosome),
        params,
        request.targets,
        data.pairwise_concurrency,
    )
    .await?;
    Ok(Json(MacroBlocksResponse { blocks }))
}

/// Parameters for `macro_synteny_paf`.
#[derive(Deserialize, Debug)]
struct MacroPafRequest {
    genome1: String,
    #[serde(default)]
    chrpfx1: String,
    chrdgt1: i64,
    nchr1: i64,
    genome2: String,
    #[serde(default)]
    chrpfx2: String,
    chrdgt2: i64,
    nchr2: i64,
    matched: i64,
    intermediate: i64,
    #[serde(default)]
    mask: Option<i64>,
}

/// Compute macro-synteny blocks between two genomes as PAF rows.
#[get("/macro-synteny-paf")]
async fn macro_synteny_paf(
    data: Data<WebServerData>,
    request: web::Query<MacroPafRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let genome_1 = paf::GenomeSpec::try_new(
        &request.genome1,
        &request.chrpfx1,
        request.chrdgt1,
        request.nchr1,
    )?;
    let genome_2 = paf::GenomeSpec::try_new(
        &request.genome2,
        &request.chrpfx2,
        request.chrdgt2,
        request.nchr2,
    )?;
    let params = pairwise::Params::try_new(
        request.matched,
        request.intermediate,
        request.mask,
        &[],
        None,
        None,
    )?;
    let rows = paf::compute(
        data.store.clone(),
        &genome_1,
        &genome_2,
        params,
        data.pairwise_concurrency,
    )
    .await?;
    Ok(HttpResponse::Ok().content_type("text/plain").body(rows))
}

/// Resolve a free-form query into gene names and regions.
#[post("/search")]
async fn search(
    data: Data<WebServerData>,
    request: Json<QueryRequest>,
) -> actix_web::Result<impl Responder, ServiceError> {
    let result = federated_search::search(data.store.clone(), request.into_inner().query).await;
    Ok(Json(result))
}

/// Encode body deserialization failures the same way as service errors.
fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorBody {
        status: "failed",
        reason: "Required arguments are missing or have invalid values".to_string(),
    });
    actix_web::error::InternalError::from_response(err, response).into()
}

/// Register every service endpoint; shared by the server and the tests.
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(get_chromosome)
        .service(search_chromosomes)
        .service(get_region)
        .service(search_genes)
        .service(get_genes)
        .service(micro_synteny_search)
        .service(pairwise_macro_synteny_blocks)
        .service(macro_synteny_blocks)
        .service(macro_synteny_paf)
        .service(search);
}

#[actix_web::main]
pub async fn main(args: &Args, data: Data<WebServerData>) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure_services)
            .wrap(Logger::default())
    })
    .bind((args.listen_host.as_str(), args.listen_port))?
    .run()
    .await
}
