pub mod count_files;
pub mod insertions;
pub mod refseq;
