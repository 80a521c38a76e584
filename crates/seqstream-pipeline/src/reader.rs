//! FASTA/FASTQ parsing into a [`SequenceSet`]

use bio::io::{fasta, fastq};
use seqstream_core::{Error, InputFormat, Result, SequenceSet};

/// Turns stored input bytes into sequences
pub trait SequenceReader: Send + Sync {
    /// Parse `bytes`; an input with no records is an error
    fn read(&self, bytes: &[u8], format: InputFormat) -> Result<SequenceSet>;
}

/// Reader backed by rust-bio's record parsers
#[derive(Debug, Clone, Copy, Default)]
pub struct BioSequenceReader;

impl SequenceReader for BioSequenceReader {
    fn read(&self, bytes: &[u8], format: InputFormat) -> Result<SequenceSet> {
        let sequences = match format {
            InputFormat::Fasta => read_fasta(bytes)?,
            InputFormat::Fastq => read_fastq(bytes)?,
        };

        if sequences.is_empty() {
            return Err(Error::NoSequences);
        }
        Ok(SequenceSet::new(sequences))
    }
}

fn read_fasta(bytes: &[u8]) -> Result<Vec<String>> {
    fasta::Reader::new(bytes)
        .records()
        .enumerate()
        .map(|(i, record)| {
            record
                .map(|r| String::from_utf8_lossy(r.seq()).into_owned())
                .map_err(|e| Error::format(format!("FASTA record {}: {}", i + 1, e)))
        })
        .collect()
}

fn read_fastq(bytes: &[u8]) -> Result<Vec<String>> {
    fastq::Reader::new(bytes)
        .records()
        .enumerate()
        .map(|(i, record)| {
            record
                .map(|r| String::from_utf8_lossy(r.seq()).into_owned())
                .map_err(|e| Error::format(format!("FASTQ record {}: {}", i + 1, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_fasta() {
        let input = b">r1 first\nACGT\nACGT\n>r2\nGGCC\n";
        let set = BioSequenceReader.read(input, InputFormat::Fasta).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0), Some("ACGTACGT"));
        assert_eq!(set.get(1), Some("GGCC"));
    }

    #[test]
    fn test_reads_fastq() {
        let input = b"@r1\nACGTN\n+\nIIIII\n@r2\nTTGA\n+\nIIII\n";
        let set = BioSequenceReader.read(input, InputFormat::Fastq).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0), Some("ACGTN"));
    }

    #[test]
    fn test_empty_input_has_no_sequences() {
        let err = BioSequenceReader.read(b"", InputFormat::Fastq).unwrap_err();
        assert!(matches!(err, Error::NoSequences));
        let err = BioSequenceReader.read(b"", InputFormat::Fasta).unwrap_err();
        assert!(matches!(err, Error::NoSequences));
    }

    #[test]
    fn test_fasta_content_is_not_fastq() {
        let err = BioSequenceReader
            .read(b">r1\nACGT\n", InputFormat::Fastq)
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }
}
