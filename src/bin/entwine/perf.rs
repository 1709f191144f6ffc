use std::time::Instant;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use entwine::prelude::*;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Number of data blocks
    #[arg(long, default_value_t = 81)]
    pub blocks: usize,

    /// Size of each data block in bytes
    #[arg(long, default_value_t = 4096)]
    pub block_size: usize,

    /// Entanglement alpha
    #[arg(short = 'a', long, default_value_t = 3)]
    pub alpha: usize,

    /// Horizontal chain period
    #[arg(short, long, default_value_t = 5)]
    pub s: usize,

    /// Helical chain period
    #[arg(short, long, default_value_t = 5)]
    pub p: usize,

    /// Fraction of data blocks dropped from the store
    #[arg(long, default_value_t = 0.5)]
    pub loss: f64,

    /// Fraction of parity blocks dropped per strand
    #[arg(long, default_value_t = 0.0)]
    pub parity_loss: f64,

    #[arg(long, default_value_t = 1)]
    pub iterations: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

pub async fn run(_config: &crate::Config, args: &Args) -> Result<(), Error> {
    let params = EntanglementParams::new(args.alpha, args.s, args.p)?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);

    let mut total_rate = 0.0;
    let mut total_elapsed = std::time::Duration::ZERO;

    for iteration in 0..args.iterations {
        let data: Vec<BlockData> = (0..args.blocks)
            .map(|_| {
                let mut block = vec![0u8; args.block_size];
                rng.fill(block.as_mut_slice());
                block
            })
            .collect();

        let mut entangler = Entangler::new(params)?;
        let mut parities = Vec::with_capacity(args.alpha * args.blocks);
        for block in &data {
            parities.extend(entangler.push(block.clone()));
        }
        parities.extend(entangler.finish());

        let source = MemorySource::load(data.clone(), parities);
        let mut source = FilteredSource::new(source)
            .without_data(sample(&mut rng, args.blocks, args.loss));
        for strand in Strand::take(args.alpha) {
            source = source.without_parity(strand, sample(&mut rng, args.blocks, args.parity_loss));
        }

        let lattice = Lattice::new(params, args.blocks, source)?;

        let started = Instant::now();
        let mut recovered = 0usize;
        for index in 1..=args.blocks as BlockIndex {
            match lattice.get_chunk(index).await {
                Ok(chunk) => {
                    debug_assert_eq!(chunk.bytes, data[index as usize - 1]);
                    recovered += 1;
                }
                Err(err) => debug!(index, %err, "block lost"),
            }
        }
        let elapsed = started.elapsed();

        let rate = recovered as f64 / args.blocks as f64;
        total_rate += rate;
        total_elapsed += elapsed;

        println!(
            "iteration {iteration}: recovered {recovered}/{} ({:.3}) in {elapsed:?}",
            args.blocks, rate
        );
    }

    println!(
        "average recover rate {:.3}, average time {:?}",
        total_rate / args.iterations as f64,
        total_elapsed / args.iterations as u32
    );

    Ok(())
}

/// Pick `fraction` of the indexes `1..=len`, uniformly without replacement.
fn sample(rng: &mut impl Rng, len: usize, fraction: f64) -> Vec<BlockIndex> {
    let count = ((len as f64) * fraction).round() as usize;
    let mut indexes: Vec<BlockIndex> = (1..=len as BlockIndex).collect();
    indexes.shuffle(rng);
    indexes.truncate(count.min(len));
    indexes
}
