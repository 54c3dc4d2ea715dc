//! Test data generators: keypairs, signed transactions and VRF-verifying
//! block chains.

use kairos_crypto::{address_of, sign_tx_body, EcVrf, Keypair};
use kairos_types::{
    merkle_root, Block, BlockHeader, CompressedPublicKey, Hash, Transaction, TxBody,
};

/// A proposer identity: keypair plus VRF context.
pub struct TestSigner {
    /// Proposer keypair.
    pub keypair: Keypair,
    /// VRF prover/verifier.
    pub vrf: EcVrf,
}

impl TestSigner {
    /// Fresh random signer.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            vrf: EcVrf::new(),
        }
    }

    /// Build a signed transaction with a distinguishing tag.
    pub fn transaction(&self, tag: u8) -> Transaction {
        let mut body = TxBody {
            hash: Hash::ZERO,
            sender: address_of(&self.keypair.compressed_public()),
            receiver: kairos_types::Address([tag; 20]),
            public_key: self.keypair.compressed_public(),
            payload: vec![tag; 8],
            timestamp: 1_700_000_000_000 + tag as i64,
        };
        body.hash = body.compute_hash();
        let signature = sign_tx_body(&self.keypair.secret, &body.hash);
        Transaction { body, signature }
    }

    /// Build the genesis block. Height 0 carries no VRF proof.
    pub fn genesis(&self) -> Block {
        self.finish_block(BlockHeader {
            timestamp: 1_700_000_000_000,
            prev_hash: Hash::ZERO,
            hash: Hash::ZERO,
            merkle_root: Hash::ZERO,
            height: 0,
            public_key: self.keypair.compressed_public(),
            params: Vec::new(),
        }, Vec::new())
    }

    /// Build a VRF-verifying child of `parent` carrying `txs`.
    pub fn next_block(&self, parent: &Block, txs: Vec<Transaction>) -> Block {
        // The round randomness is bound to the parent so every height gets
        // a distinct proof.
        let alpha = *parent.header.hash.as_bytes();
        let params = self
            .vrf
            .prove(&self.keypair.secret, &alpha)
            .expect("proving never fails for a valid key")
            .to_bytes()
            .expect("params serialize");

        self.finish_block(
            BlockHeader {
                timestamp: parent.header.timestamp + 1000,
                prev_hash: parent.header.hash,
                hash: Hash::ZERO,
                merkle_root: merkle_root(&txs),
                height: parent.header.height + 1,
                public_key: self.keypair.compressed_public(),
                params,
            },
            txs,
        )
    }

    /// Build a chain of `len` blocks starting at genesis, `txs_per_block`
    /// transactions each (genesis stays empty).
    pub fn chain(&self, len: usize, txs_per_block: usize) -> Vec<Block> {
        let mut blocks = vec![self.genesis()];
        for height in 1..len {
            let txs = (0..txs_per_block)
                .map(|i| self.transaction((height * 16 + i) as u8))
                .collect();
            let next = self.next_block(blocks.last().expect("nonempty"), txs);
            blocks.push(next);
        }
        blocks
    }

    fn finish_block(&self, header: BlockHeader, txs: Vec<Transaction>) -> Block {
        let mut block = Block {
            header,
            transactions: txs,
        };
        block.header.merkle_root = merkle_root(&block.transactions);
        block.header.hash = block.compute_hash();
        block
    }
}

impl Default for TestSigner {
    fn default() -> Self {
        Self::new()
    }
}

/// An unverifiable public key for negative tests.
pub fn bogus_public_key() -> CompressedPublicKey {
    CompressedPublicKey([0x05; 33])
}
