//! Data pipeline: phenotype, covariates, sample intersection, design
//! matrices and standardized genotype matrices.

pub mod design;
pub mod standardize;

use std::path::PathBuf;

use anyhow::{Context, Result};
use gelex_geno::grm_io;
use gelex_geno::phenotype::{self, CatCovariates, QuantCovariates};
use gelex_geno::plink::{self, BedReader, Bfile};
use gelex_geno::{
    GelexError, GenotypeMatrix, MappedGenotypeMatrix, MarkerInfo, MarkerStats, SampleManager,
    SampleResolver,
};
use gelex_linalg::DenseMatrix;
use tracing::{debug, info};

pub use design::{FixedDesign, RandomDesign};
pub use standardize::Policy;

/// Inputs of the data pipeline.
#[derive(Debug, Clone)]
pub struct DataPipeConfig {
    /// PLINK trio prefix.
    pub bfile: String,
    pub pheno: PathBuf,
    /// 0-based, counted from the first column after FID and IID.
    pub pheno_col: usize,
    pub qcovar: Option<PathBuf>,
    pub dcovar: Option<PathBuf>,
    /// Categorical covariates modelled as random effects.
    pub rcovar: Vec<String>,
    /// GRM prefixes whose sample lists take part in the intersection.
    pub grms: Vec<String>,
    pub iid_only: bool,
    /// Markers per decoded chunk.
    pub chunk_size: usize,
}

impl Default for DataPipeConfig {
    fn default() -> Self {
        Self {
            bfile: String::new(),
            pheno: PathBuf::new(),
            pheno_col: 0,
            qcovar: None,
            dcovar: None,
            rcovar: Vec::new(),
            grms: Vec::new(),
            iid_only: false,
            chunk_size: 10000,
        }
    }
}

/// Output of the pipeline, shared read-only by every downstream consumer.
#[derive(Debug, Clone)]
pub struct DataPipe {
    pub bfile: Bfile,
    pub markers: Vec<MarkerInfo>,
    pub samples: SampleManager,
    pub pheno_name: String,
    /// Phenotype in dense sample order.
    pub y: Vec<f64>,
    pub fixed: FixedDesign,
    pub random: Vec<RandomDesign>,
    pub chunk_size: usize,
}

impl DataPipe {
    pub fn load(config: &DataPipeConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(GelexError::config("chunk size must be positive").into());
        }
        let bfile = Bfile::new(&config.bfile);
        let fam = plink::read_fam(&bfile.fam)?;
        let markers = plink::read_bim(&bfile.bim)?;
        info!(
            "Loaded {} samples and {} markers from {}",
            fam.len(),
            markers.len(),
            config.bfile
        );

        let pheno = phenotype::read_phenotype(&config.pheno, config.pheno_col, config.iid_only)?;
        let qcovar = match &config.qcovar {
            Some(path) => phenotype::read_qcovar(path, config.iid_only)?,
            None => QuantCovariates::default(),
        };
        let mut dcovar = match &config.dcovar {
            Some(path) => phenotype::read_dcovar(path, config.iid_only)?,
            None => CatCovariates::default(),
        };
        let rcovar = dcovar.split_off(&config.rcovar)?;

        let mut resolver = SampleResolver::new(&fam, config.iid_only);
        resolver.intersect(pheno.values.keys().map(String::as_str));
        if config.qcovar.is_some() {
            resolver.intersect(qcovar.values.keys().map(String::as_str));
        }
        if config.dcovar.is_some() {
            resolver.intersect(dcovar.values.keys().map(String::as_str));
        }
        for prefix in &config.grms {
            let ids = grm_io::read_grm_ids(prefix, config.iid_only)?;
            resolver.intersect(ids.iter().map(String::as_str));
        }
        let samples = resolver.finalize()?;
        let n = samples.len();

        let y = samples.align(&pheno.values)?;
        let qvalues = if qcovar.names.is_empty() {
            vec![Vec::new(); n]
        } else {
            samples.align(&qcovar.values)?
        };
        let dvalues = if dcovar.names.is_empty() {
            vec![Vec::new(); n]
        } else {
            samples.align(&dcovar.values)?
        };
        let fixed = FixedDesign::build(n, &qcovar.names, &qvalues, &dcovar.names, &dvalues);

        let mut random = Vec::with_capacity(rcovar.names.len());
        if !rcovar.names.is_empty() {
            let rvalues = samples.align(&rcovar.values)?;
            for (k, name) in rcovar.names.iter().enumerate() {
                let col: Vec<String> = rvalues.iter().map(|row| row[k].clone()).collect();
                random.push(RandomDesign::build(name, &col));
            }
        }

        info!(
            "{} samples in common; phenotype '{}'; {} fixed terms; {} random effects",
            n,
            pheno.name,
            fixed.ncols(),
            random.len()
        );

        Ok(Self {
            bfile,
            markers,
            samples,
            pheno_name: pheno.name,
            y,
            fixed,
            random,
            chunk_size: config.chunk_size,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn reader(&self) -> Result<BedReader> {
        BedReader::open(&self.bfile.bed, self.markers.len(), &self.samples)
    }

    /// Decode and code every marker, handing each chunk to `sink`.
    fn stream<F>(&self, policy: Policy, mut sink: F) -> Result<()>
    where
        F: FnMut(&[f64], &MarkerStats) -> Result<()>,
    {
        stream_markers(&self.reader()?, policy, self.chunk_size, &mut sink)
    }

    /// Standardized matrix held in memory.
    pub fn genotype_matrix(&self, policy: Policy) -> Result<GenotypeMatrix> {
        let mut matrix = GenotypeMatrix::empty(self.n_samples());
        self.stream(policy, |chunk, stats| matrix.append(chunk, stats))?;
        info!(
            "{} genotype matrix: {} x {} ({} monomorphic)",
            policy,
            self.n_samples(),
            self.n_markers(),
            gelex_geno::GenotypeStore::num_mono(&matrix)
        );
        Ok(matrix)
    }

    /// Standardized matrix written to `<prefix>.bin` / `<prefix>.stats` and
    /// mapped back read-only.
    pub fn mapped_genotype_matrix(&self, policy: Policy, prefix: &str) -> Result<MappedGenotypeMatrix> {
        let mut writer = gelex_geno::mmap::StandardizedWriter::create(prefix, self.n_samples())?;
        self.stream(policy, |chunk, stats| writer.write_chunk(chunk, stats))?;
        writer.finish()?;
        MappedGenotypeMatrix::open(prefix)
    }

    /// Normalized GRMs reordered to the dense sample order.
    pub fn read_grms(&self, prefixes: &[String]) -> Result<Vec<DenseMatrix>> {
        prefixes
            .iter()
            .map(|prefix| {
                let mut k = grm_io::read_grm(prefix, &self.samples)
                    .with_context(|| format!("Failed to load GRM {}", prefix))?;
                let denom = grm_io::normalize(&mut k)?;
                debug!("GRM {} normalized by {:.4}", prefix, denom);
                Ok(k)
            })
            .collect()
    }
}

/// Decode `reader` in chunks of `chunk_size` markers, code each chunk with
/// `policy` and pass it on. Chunks arrive in marker order.
pub fn stream_markers<F>(
    reader: &BedReader,
    policy: Policy,
    chunk_size: usize,
    sink: &mut F,
) -> Result<()>
where
    F: FnMut(&[f64], &MarkerStats) -> Result<()>,
{
    if chunk_size == 0 {
        return Err(GelexError::config("chunk size must be positive").into());
    }
    let n = reader.n_samples();
    let m = reader.n_markers();
    let mut buf = Vec::new();
    let mut start = 0;
    while start < m {
        let end = (start + chunk_size).min(m);
        buf.resize(n * (end - start), 0.0);
        reader.decode_chunk(start, end, &mut buf)?;
        let stats = standardize::standardize_chunk(policy, n, &mut buf);
        sink(&buf, &stats)?;
        start = end;
    }
    Ok(())
}
