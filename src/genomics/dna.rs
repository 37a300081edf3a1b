//! Nucleotide helpers shared by the index, the pileup walker and the voter.

/// Number of determinate bases (A, C, G, T).
pub const NUM_BASES: usize = 4;

/// Determinate bases in table column order.
pub const BASES: [u8; NUM_BASES] = [b'A', b'C', b'G', b'T'];

/// Index of a determinate base in [`BASES`].
pub fn base_index(base: u8) -> Option<usize> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Whether every base of `sequence` is one of A, C, G, T.
///
/// Anything else (N, other IUPAC codes, lowercase, gaps) counts as undetermined.
pub fn is_determinate(sequence: &[u8]) -> bool {
    sequence.iter().all(|&base| base_index(base).is_some())
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        other => other,
    }
}

/// Reverse complement of a nucleotide sequence. Unknown symbols are kept as-is.
pub fn reverse_complement(sequence: &[u8]) -> Vec<u8> {
    sequence.iter().rev().map(|&base| complement(base)).collect()
}
