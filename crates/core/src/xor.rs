//! Bytewise XOR with length reconciliation.
//!
//! Every recovery step in the lattice rests on the algebra of this kernel:
//! XOR is associative and commutative and the empty block is its identity.

use crate::BlockData;

/// XOR two chunks, logically zero-padding the shorter operand to the length
/// of the longer. An empty operand yields a fresh copy of the other.
pub fn xor_bytes(a: &[u8], b: &[u8]) -> BlockData {
    if a.is_empty() {
        return b.to_vec();
    }
    if b.is_empty() {
        return a.to_vec();
    }

    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut out = long.to_vec();
    for (lhs, rhs) in out.iter_mut().zip(short) {
        *lhs ^= rhs;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_operand_is_identity() {
        assert_eq!(xor_bytes(&[], &[1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(xor_bytes(&[1, 2, 3], &[]), vec![1, 2, 3]);
        assert_eq!(xor_bytes(&[], &[]), Vec::<u8>::new());
    }

    #[test]
    fn zero_block_is_identity() {
        let a = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(xor_bytes(&a, &[0, 0, 0, 0]), a);
    }

    #[test]
    fn output_length_is_max_of_inputs() {
        let out = xor_bytes(&[0xff, 0xff], &[0x0f, 0x0f, 0xaa]);
        assert_eq!(out, vec![0xf0, 0xf0, 0xaa]);
    }

    #[test]
    fn xor_twice_restores_padded_operand() {
        let a = vec![1, 2, 3];
        let b = vec![9, 8, 7, 6, 5];
        let mut padded_a = a.clone();
        padded_a.resize(b.len(), 0);
        assert_eq!(xor_bytes(&xor_bytes(&a, &b), &b), padded_a);
    }
}
