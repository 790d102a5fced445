// End-to-end ledger behaviour: genesis, spends, UTXO index maintenance

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;
use utxo_gossip::consensus::ProofOfWork;
use utxo_gossip::core::MINING_REWARD;
use utxo_gossip::{
    Blockchain, Error, KeyPair, Storage, Transaction, TransactionBuilder, UtxoSet, ValidationError,
};

const TEST_DIFFICULTY: u32 = 8;

struct Ledger {
    chain: Arc<Blockchain>,
    utxo_set: UtxoSet,
}

fn create_ledger(owner: &KeyPair) -> Ledger {
    let storage = Storage::memory().unwrap();
    let chain = Arc::new(Blockchain::create(&storage, &owner.pub_key_hash(), TEST_DIFFICULTY).unwrap());
    let utxo_set = UtxoSet::new(&storage, chain.clone()).unwrap();
    utxo_set.reindex().unwrap();
    Ledger { chain, utxo_set }
}

#[test]
fn test_genesis_pays_creator() {
    let addr1 = KeyPair::generate();
    let ledger = create_ledger(&addr1);

    let genesis = ledger.chain.last_block().unwrap();
    assert_eq!(genesis.height, 0);
    assert!(genesis.prev_hash.is_zero());
    assert_eq!(genesis.transactions.len(), 1);

    let outputs = ledger.utxo_set.find_utxo(&addr1.pub_key_hash()).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].value, MINING_REWARD);
    assert_eq!(outputs[0].pub_key_hash, addr1.pub_key_hash());
}

#[test]
fn test_spend_and_reward() {
    let addr1 = KeyPair::generate();
    let addr2 = KeyPair::generate();
    let ledger = create_ledger(&addr1);

    let tx = TransactionBuilder::new(&ledger.utxo_set, &ledger.chain)
        .build(&addr1, &addr2.address(), 5)
        .unwrap();
    let coinbase = Transaction::coinbase(&addr1.pub_key_hash(), "");
    let block = ledger.chain.mine_block(vec![tx, coinbase]).unwrap();
    assert_eq!(block.height, 1);

    ledger.utxo_set.reindex().unwrap();

    // 15 change plus the 20 reward
    assert_eq!(ledger.utxo_set.balance(&addr1.pub_key_hash()).unwrap(), 35);
    assert_eq!(ledger.utxo_set.balance(&addr2.pub_key_hash()).unwrap(), 5);
    assert_eq!(ledger.utxo_set.count_transactions().unwrap(), 2);
}

#[test]
fn test_mined_blocks_carry_valid_proof() {
    let owner = KeyPair::generate();
    let ledger = create_ledger(&owner);

    for _ in 0..3 {
        let coinbase = Transaction::coinbase(&owner.pub_key_hash(), "");
        ledger.chain.mine_block(vec![coinbase]).unwrap();
    }

    for block in ledger.chain.iter() {
        let block = block.unwrap();
        let pow = ProofOfWork::new(&block, TEST_DIFFICULTY);
        assert!(pow.validate());
        assert_eq!(pow.compute_hash().unwrap(), block.hash);
    }
    assert_eq!(ledger.chain.block_hashes().unwrap().len(), 4);
}

#[test]
fn test_reindex_is_idempotent() {
    let owner = KeyPair::generate();
    let other = KeyPair::generate();
    let ledger = create_ledger(&owner);

    let tx = TransactionBuilder::new(&ledger.utxo_set, &ledger.chain)
        .build(&owner, &other.address(), 7)
        .unwrap();
    ledger.chain.mine_block(vec![tx]).unwrap();

    ledger.utxo_set.reindex().unwrap();
    let first = ledger.utxo_set.entries().unwrap();
    ledger.utxo_set.reindex().unwrap();
    let second = ledger.utxo_set.entries().unwrap();

    assert_eq!(first, second);
    assert_eq!(ledger.utxo_set.count_transactions().unwrap(), 1);
}

#[test]
fn test_incremental_update_matches_reindex() {
    let owner = KeyPair::generate();
    let other = KeyPair::generate();
    let ledger = create_ledger(&owner);

    for amount in [3, 4] {
        let tx = TransactionBuilder::new(&ledger.utxo_set, &ledger.chain)
            .build(&owner, &other.address(), amount)
            .unwrap();
        let coinbase = Transaction::coinbase(&owner.pub_key_hash(), "");
        let block = ledger.chain.mine_block(vec![tx, coinbase]).unwrap();
        ledger.utxo_set.update(&block).unwrap();
    }

    let updated = ledger.utxo_set.entries().unwrap();
    ledger.utxo_set.reindex().unwrap();
    assert_eq!(updated, ledger.utxo_set.entries().unwrap());

    assert_eq!(ledger.utxo_set.balance(&other.pub_key_hash()).unwrap(), 7);
    assert_eq!(ledger.utxo_set.balance(&owner.pub_key_hash()).unwrap(), 20 - 7 + 40);
}

#[test]
fn test_spent_outputs_are_not_spendable_again() {
    let owner = KeyPair::generate();
    let other = KeyPair::generate();
    let ledger = create_ledger(&owner);

    let builder = TransactionBuilder::new(&ledger.utxo_set, &ledger.chain);
    let tx = builder.build(&owner, &other.address(), 20).unwrap();
    let block = ledger.chain.mine_block(vec![tx]).unwrap();
    ledger.utxo_set.update(&block).unwrap();

    let result = builder.build(&owner, &other.address(), 1);
    assert!(matches!(
        result,
        Err(Error::InsufficientFunds { available: 0, required: 1 })
    ));
}

#[test]
fn test_block_from_foreign_chain_is_rejected() {
    let owner = KeyPair::generate();
    let ledger = create_ledger(&owner);
    let foreign = create_ledger(&owner);

    let block = foreign
        .chain
        .mine_block(vec![Transaction::coinbase(&owner.pub_key_hash(), "")])
        .unwrap();

    assert!(matches!(
        ledger.chain.add_block(&block),
        Err(Error::Validation(ValidationError::PrevHashMismatch { .. }))
    ));
    assert_eq!(ledger.chain.best_height().unwrap(), 0);
}

#[test]
fn test_index_follows_chain_order_when_blocks_race() {
    let owner = KeyPair::generate();
    let middle = KeyPair::generate();
    let other = KeyPair::generate();
    let source = create_ledger(&owner);

    // b2 spends the output b1 creates
    let tx1 = TransactionBuilder::new(&source.utxo_set, &source.chain)
        .build(&owner, &middle.address(), 5)
        .unwrap();
    let b1 = source.utxo_set.mine_block(vec![tx1]).unwrap();
    let tx2 = TransactionBuilder::new(&source.utxo_set, &source.chain)
        .build(&middle, &other.address(), 5)
        .unwrap();
    let b2 = source.utxo_set.mine_block(vec![tx2]).unwrap();

    let storage = Storage::memory().unwrap();
    let genesis = source.chain.get_block_by_height(0).unwrap();
    let chain = Arc::new(Blockchain::init_with_genesis(&storage, genesis, TEST_DIFFICULTY).unwrap());
    let utxo_set = UtxoSet::new(&storage, chain.clone()).unwrap();
    utxo_set.reindex().unwrap();

    let (sender, receiver) = mpsc::channel();
    let (index, second) = (&utxo_set, &b2);
    thread::scope(|scope| {
        let added = chain.add_block_with(&b1, |block| {
            // b2 is delivered while b1 is still being indexed
            scope.spawn(move || {
                let added = index.add_block(second);
                sender.send(added.is_ok()).unwrap();
            });
            assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
            index.update(block)
        });
        assert!(added.unwrap());
    });
    assert!(receiver.recv().unwrap());

    assert_eq!(chain.last_hash(), b2.hash);
    assert_eq!(utxo_set.balance(&other.pub_key_hash()).unwrap(), 5);
    assert_eq!(utxo_set.balance(&middle.pub_key_hash()).unwrap(), 0);

    let indexed = utxo_set.entries().unwrap();
    utxo_set.reindex().unwrap();
    assert_eq!(indexed, utxo_set.entries().unwrap());
}
