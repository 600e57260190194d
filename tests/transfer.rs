use bitcoin::Network;
use ordkit::bitcoin_utils::fees::estimate_psbt_vsize;
use ordkit::bitcoin_utils::keys::StandardResolver;
use ordkit::bitcoin_utils::psbt::decode_psbt;
use ordkit::builder::transfer::{create_transfer_psbt, InputRequest, OutputRequest, TransferConfig};
use ordkit::testing::{address, public_key, TestChain};
use ordkit::types::{AddressFormat, SafeMode, Utxo};
use ordkit::{Error, FaultKind};

const NET: Network = Network::Regtest;

fn transfer(from: AddressFormat, outputs: &[(u64, u8)], fee_rate: u64) -> TransferConfig {
    TransferConfig {
        pubkey: public_key(1).to_string(),
        network: NET,
        formats: vec![from],
        inputs: vec![InputRequest { address: address(1, from, NET).to_string() }],
        outputs: outputs
            .iter()
            .map(|&(value, seed)| OutputRequest {
                address: address(seed, AddressFormat::Taproot, NET).to_string(),
                value,
            })
            .collect(),
        fee_rate,
        safe_mode: SafeMode::On,
    }
}

#[test]
fn single_taproot_utxo_pays_output_and_change() {
    let mut chain = TestChain::new(NET);
    let utxo = chain.fund(&public_key(1), AddressFormat::Taproot, 10_000);

    let built = create_transfer_psbt(&StandardResolver, &chain.indexer, &transfer(AddressFormat::Taproot, &[(1_200, 2)], 9))
        .unwrap();

    // 57.5 + 43 * 2 + 10.5 = 154 vB
    assert_eq!(built.virtual_size, 154);
    assert_eq!(built.fee, 1_386);
    assert_eq!(built.change, Some(10_000 - 1_200 - 1_386));

    let tx = &built.psbt.unsigned_tx;
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.input[0].previous_output, utxo.outpoint());
    assert_eq!(tx.input[0].sequence.0, 0xffff_fffd);
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[0].value.to_sat(), 1_200);
    assert_eq!(tx.output[1].value.to_sat(), 7_414);
    assert_eq!(tx.output[1].script_pubkey, address(1, AddressFormat::Taproot, NET).script_pubkey());
    assert!(built.psbt.inputs[0].tap_internal_key.is_some());
}

#[test]
fn dust_change_is_folded_into_fee() {
    let mut chain = TestChain::new(NET);
    chain.fund(&public_key(1), AddressFormat::Taproot, 10_000);

    let built = create_transfer_psbt(&StandardResolver, &chain.indexer, &transfer(AddressFormat::Taproot, &[(8_100, 2)], 9))
        .unwrap();
    assert_eq!(built.psbt.unsigned_tx.output.len(), 1);
    assert_eq!(built.change, None);
    assert_eq!(built.fee, 10_000 - 8_100);
}

#[test]
fn hex_round_trip_preserves_shape() {
    let mut chain = TestChain::new(NET);
    chain.fund(&public_key(1), AddressFormat::Segwit, 30_000);
    chain.fund(&public_key(1), AddressFormat::Segwit, 12_000);

    let built = create_transfer_psbt(
        &StandardResolver,
        &chain.indexer,
        &transfer(AddressFormat::Segwit, &[(5_000, 2), (7_000, 3)], 4),
    )
    .unwrap();

    for encoded in [&built.hex, &built.base64] {
        let decoded = decode_psbt(encoded).unwrap();
        assert_eq!(decoded.inputs.len(), built.psbt.inputs.len());
        assert_eq!(decoded.outputs.len(), built.psbt.outputs.len());
        let values = |p: &bitcoin::psbt::Psbt| p.unsigned_tx.output.iter().map(|o| o.value).collect::<Vec<_>>();
        assert_eq!(values(&decoded), values(&built.psbt));
        assert_eq!(decoded.unsigned_tx.compute_txid(), built.psbt.unsigned_tx.compute_txid());
    }

    // re-sizing the finished PSBT counts the change output too
    assert!(estimate_psbt_vsize(&built.psbt).unwrap() >= built.virtual_size);
}

#[test]
fn legacy_inputs_carry_previous_transaction() {
    let mut chain = TestChain::new(NET);
    let utxo = chain.fund(&public_key(1), AddressFormat::Legacy, 50_000);

    let built = create_transfer_psbt(&StandardResolver, &chain.indexer, &transfer(AddressFormat::Legacy, &[(10_000, 2)], 2))
        .unwrap();
    let input = &built.psbt.inputs[0];
    assert!(input.witness_utxo.is_none());
    assert_eq!(input.non_witness_utxo.as_ref().unwrap().compute_txid(), utxo.txid);
    // legacy sizing: 146 + 33 * 2 + 10.5 = 222.5 -> 223
    assert_eq!(built.virtual_size, 223);
}

fn unbindable(chain: &mut TestChain, value: u64) -> Utxo {
    let mut utxo = chain.fund(&public_key(1), AddressFormat::Taproot, value);
    chain.indexer.utxos.get_mut(&utxo.address).unwrap().retain(|u| u.outpoint() != utxo.outpoint());
    utxo.script_type = "nonstandard".into();
    chain.indexer.add_utxo(utxo.clone());
    utxo
}

#[test]
fn unsupported_inputs_are_skipped_then_escalated() {
    let mut chain = TestChain::new(NET);
    let bad = unbindable(&mut chain, 40_000);
    chain.fund(&public_key(1), AddressFormat::Taproot, 20_000);

    let built = create_transfer_psbt(&StandardResolver, &chain.indexer, &transfer(AddressFormat::Taproot, &[(1_000, 2)], 1))
        .unwrap();
    assert_eq!(built.psbt.inputs.len(), 1);
    assert_eq!(built.unsupported_inputs.len(), 1);
    assert!(built.unsupported_inputs[0].contains(&bad.txid.to_string()));

    let mut only_bad = TestChain::new(NET);
    unbindable(&mut only_bad, 40_000);
    let err = create_transfer_psbt(&StandardResolver, &only_bad.indexer, &transfer(AddressFormat::Taproot, &[(1_000, 2)], 1))
        .unwrap_err();
    assert_eq!(err.kind(), FaultKind::UnsupportedInput);
}

#[test]
fn empty_wallet_is_funds_fault() {
    let chain = TestChain::new(NET);
    let err = create_transfer_psbt(&StandardResolver, &chain.indexer, &transfer(AddressFormat::Taproot, &[(1_000, 2)], 1))
        .unwrap_err();
    assert!(matches!(err, Error::NoUtxos(_)));
    assert_eq!(err.kind(), FaultKind::Funds);
}
