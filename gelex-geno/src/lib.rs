//! gelex-geno: genotype and input-file I/O for gelex.
//!
//! PLINK bed/bim/fam reading with a memory-mapped 2-bit decoder, sample
//! intersection, phenotype and covariate tables, GRM file pairs, and the
//! standardized genotype matrix (owned or memory-mapped).

pub mod error;
pub mod grm_io;
pub mod matrix;
pub mod mmap;
pub mod phenotype;
pub mod plink;
pub mod sample;
pub mod table;
pub mod testing;
pub mod traits;

pub use error::{error_kind, ErrorKind, GelexError};
pub use matrix::GenotypeMatrix;
pub use mmap::MappedGenotypeMatrix;
pub use plink::{BedReader, Bfile, FamEntry};
pub use sample::{SampleManager, SampleResolver};
pub use traits::{GenotypeStore, MarkerInfo, MarkerStats};
