use k256::ecdsa::SigningKey;
use rocket::serde::json::{json, Value};
use rocket::tokio::sync::Mutex;
use serde::Serialize;

use crate::model::{
    election::{ChoiceId, ElectionId},
    signature::{encode_hex, Address},
};

use super::{
    abi,
    rpc::{self, HttpTransport, Transport},
    transaction::Eip1559Transaction,
    Ledger, LedgerError, TxHash, VoterKey,
};

const HAS_VOTED: &str = "hasVoted(bytes32)";
const MARK_VOTED_AND_COUNT: &str = "markVotedAndCount(uint256,bytes32,uint256)";
const GET_CHOICE_COUNT: &str = "getChoiceCount(uint256,uint256)";

/// Fee and chain parameters for relayed transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub chain_id: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u64,
    pub max_priority_fee_per_gas: u64,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxStatus {
    pub succeeded: bool,
    pub block_number: u64,
    pub transaction_index: u64,
    pub gas_used: u64,
    pub logs: usize,
}

/// The voting contract on an Ethereum-style chain, with every write relayed
/// from a single account.
pub struct EthLedger<T = HttpTransport> {
    transport: T,
    contract: Address,
    relayer: SigningKey,
    relayer_address: Address,
    fees: FeeSchedule,
    /// Nonce of the last transaction this process had accepted. Also the
    /// lock that serialises submissions.
    last_nonce: Mutex<Option<u64>>,
}

impl<T: Transport> EthLedger<T> {
    pub fn new(transport: T, contract: Address, relayer: SigningKey, fees: FeeSchedule) -> Self {
        let relayer_address = Address::from_verifying_key(relayer.verifying_key());
        Self {
            transport,
            contract,
            relayer,
            relayer_address,
            fees,
            last_nonce: Mutex::new(None),
        }
    }

    pub fn relayer_address(&self) -> Address {
        self.relayer_address
    }

    async fn call(&self, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let params = json!([
            {
                "to": self.contract.to_string(),
                "data": encode_hex(data),
            },
            "latest",
        ]);
        let result = self.transport.request("eth_call", params).await?;
        rpc::parse_data(&result)
    }

    async fn pending_nonce(&self) -> Result<u64, LedgerError> {
        let params = json!([self.relayer_address.to_string(), "pending"]);
        let result = self
            .transport
            .request("eth_getTransactionCount", params)
            .await?;
        rpc::parse_quantity(&result)
    }

    /// Look up the receipt of a transaction, if it has been mined.
    pub async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<TxStatus>, LedgerError> {
        let receipt = self
            .transport
            .request("eth_getTransactionReceipt", json!([hash.0]))
            .await?;
        if receipt.is_null() {
            return Ok(None);
        }

        let field = |name: &str| {
            receipt
                .get(name)
                .ok_or_else(|| LedgerError::Malformed(format!("receipt without {name}")))
        };
        Ok(Some(TxStatus {
            succeeded: rpc::parse_quantity(field("status")?)? == 1,
            block_number: rpc::parse_quantity(field("blockNumber")?)?,
            transaction_index: rpc::parse_quantity(field("transactionIndex")?)?,
            gas_used: rpc::parse_quantity(field("gasUsed")?)?,
            logs: field("logs")?.as_array().map_or(0, Vec::len),
        }))
    }
}

#[rocket::async_trait]
impl<T: Transport> Ledger for EthLedger<T> {
    async fn has_voted(&self, key: &VoterKey) -> Result<bool, LedgerError> {
        let data = abi::encode_call(HAS_VOTED, &[*key.as_bytes()]);
        abi::decode_bool(&self.call(data).await?)
    }

    async fn submit_vote(
        &self,
        election_id: ElectionId,
        key: &VoterKey,
        choice_id: ChoiceId,
    ) -> Result<TxHash, LedgerError> {
        let data = abi::encode_call(
            MARK_VOTED_AND_COUNT,
            &[
                abi::uint(election_id.into()),
                *key.as_bytes(),
                abi::uint(choice_id.into()),
            ],
        );

        // Held until the node has accepted the transaction, so no two
        // submissions from this process can pick the same nonce.
        let mut last_nonce = self.last_nonce.lock().await;
        let pending = self.pending_nonce().await?;
        let nonce = match *last_nonce {
            Some(last) => pending.max(last + 1),
            None => pending,
        };

        let tx = Eip1559Transaction {
            chain_id: self.fees.chain_id,
            nonce,
            max_priority_fee_per_gas: self.fees.max_priority_fee_per_gas,
            max_fee_per_gas: self.fees.max_fee_per_gas,
            gas_limit: self.fees.gas_limit,
            to: self.contract,
            data,
        };
        let signed = tx.sign(&self.relayer)?;

        let result = self
            .transport
            .request("eth_sendRawTransaction", json!([encode_hex(&signed.raw)]))
            .await?;
        *last_nonce = Some(nonce);

        let hash = TxHash(rpc::as_str(&result)?.to_lowercase());
        if hash != signed.hash {
            warn!("Node reported transaction hash {hash}, expected {}", signed.hash);
        }
        info!("Relayed vote in election {election_id} as {hash} (nonce {nonce})");
        Ok(hash)
    }

    async fn choice_count(
        &self,
        election_id: ElectionId,
        choice_id: ChoiceId,
    ) -> Result<u64, LedgerError> {
        let data = abi::encode_call(
            GET_CHOICE_COUNT,
            &[abi::uint(election_id.into()), abi::uint(choice_id.into())],
        );
        abi::decode_u64(&self.call(data).await?)
    }
}
