//! End-to-end recovery scenarios over a seeded in-memory store.

use entwine::prelude::*;
use entwine_testing::{random_blocks, seed_entangled_file};

fn params(alpha: usize, s: usize, p: usize) -> EntanglementParams {
    EntanglementParams::new(alpha, s, p).unwrap()
}

#[tokio::test]
async fn full_data_loss_recovers_everything() {
    // ~5MB file in 4-KiB blocks, all data identifiers gone, parities intact.
    let params = params(3, 5, 5);
    let blocks = random_blocks(21, 4096, 11);
    let file = seed_entangled_file(params, &blocks);
    file.drop_data(1..=21);

    let lattice = Lattice::new(params, 21, file.source()).unwrap();

    let mut recovered = 0;
    for index in 1..=21 {
        let chunk = lattice.get_chunk(index).await.unwrap();
        assert_eq!(chunk.bytes, blocks[index as usize - 1]);
        assert!(chunk.repaired, "block {index} should be flagged repaired");
        recovered += 1;
    }
    assert_eq!(recovered, 21);
}

#[tokio::test]
async fn single_block_loss_repairs_only_that_block() {
    let params = params(3, 5, 5);
    let blocks = random_blocks(81, 4096, 12);
    let file = seed_entangled_file(params, &blocks);
    file.drop_data([1]);

    let lattice = Lattice::new(params, 81, file.source()).unwrap();

    let chunk = lattice.get_chunk(1).await.unwrap();
    assert_eq!(chunk.bytes, blocks[0]);
    assert!(chunk.repaired);

    for index in 2..=81 {
        let chunk = lattice.get_chunk(index).await.unwrap();
        assert_eq!(chunk.bytes, blocks[index as usize - 1]);
        assert!(!chunk.repaired, "block {index} was never lost");
    }
}

#[tokio::test]
async fn two_step_recovery_through_neighbor_parities() {
    // The block and all three of its own parities are gone; the engine has
    // to rebuild a parity from an adjacent pair first.
    let params = params(3, 5, 5);
    let blocks = random_blocks(25, 4096, 13);
    let file = seed_entangled_file(params, &blocks);
    file.drop_data([13]);
    for strand in 0..3 {
        file.drop_parity(strand, [13]);
    }

    let lattice = Lattice::new(params, 25, file.source()).unwrap();

    let chunk = lattice.get_chunk(13).await.unwrap();
    assert_eq!(chunk.bytes, blocks[12]);
    assert!(chunk.repaired);
}

#[tokio::test]
async fn isolated_block_fails_with_exhaustion() {
    // With five blocks and s = 5 every chain has one member, so a block
    // that lost all of its parities has no recovery path left.
    let params = params(3, 5, 5);
    let blocks = random_blocks(5, 4096, 14);
    let file = seed_entangled_file(params, &blocks);
    file.drop_data([1]);
    for strand in 0..3 {
        file.drop_parity(strand, [1]);
    }

    let lattice = Lattice::new(params, 5, file.source()).unwrap();

    let err = lattice.get_chunk(1).await.unwrap_err();
    assert!(matches!(err, RecoveryError::Exhausted { index: 1 }));
}

#[tokio::test]
async fn linear_code_round_trips() {
    let params = params(1, 1, 0);
    let blocks = random_blocks(10, 1024, 15);
    let file = seed_entangled_file(params, &blocks);

    let lattice = Lattice::new(params, 10, file.source()).unwrap();
    let (recovered, repaired) = lattice.get_all_data().await.unwrap();

    assert_eq!(recovered, blocks);
    assert!(!repaired);
}

#[tokio::test]
async fn linear_code_survives_single_loss() {
    let params = params(1, 1, 0);
    let blocks = random_blocks(10, 1024, 16);
    let file = seed_entangled_file(params, &blocks);
    file.drop_data([4]);

    let lattice = Lattice::new(params, 10, file.source()).unwrap();
    let chunk = lattice.get_chunk(4).await.unwrap();
    assert_eq!(chunk.bytes, blocks[3]);
    assert!(chunk.repaired);
}
