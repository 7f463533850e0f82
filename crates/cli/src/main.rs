//! zkattr command-line driver
//!
//! Covers the whole attribute lifecycle: identity generation, trusted
//! setup, certification, proving, verification, and an in-process
//! end-to-end demo of the key-release protocol.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::thread_rng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use authority::{Authority, AuthorityConfig};
use crypto::{derive_key_share, load_identity, save_identity, Identity};
use ledger::{CommitmentRegistry, OnChainVerifier};
use protocol::{AccessMessage, KeyRequest};
use zk::{
    encode_attr_value, Attestation, AttributeRecord, CircuitKeys, CircuitKind, KeyStore,
    PolicyShape, PolicySlot, ProcessStep, ZkError,
};

#[derive(Parser)]
#[command(name = "zkattr", version, about = "Privacy-preserving attribute attestation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an identity and print its GID
    Keygen {
        /// Where to write the seed (default: ~/.zkattr/seed)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the GID of the stored identity
    Whoami {
        /// Seed file to read (default: ~/.zkattr/seed)
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Run trusted setup for all three circuits and write key artifacts
    Setup {
        /// Output directory for key bundles
        #[arg(long, default_value = "keys")]
        dir: PathBuf,

        /// Policy identifier compiled into the policy circuit
        #[arg(long, default_value_t = 1)]
        policy_id: u64,

        /// Policy slots as authority_id:attr_type, exactly two
        #[arg(long = "slot", default_values_t = [String::from("1:1"), String::from("2:2")])]
        slots: Vec<String>,
    },

    /// Create a certified attribute record and print its commitment
    Certify {
        /// Attribute value, numeric or short text (up to 8 bytes)
        #[arg(long)]
        value: String,

        #[arg(long)]
        authority_id: u32,

        #[arg(long)]
        attr_type: u32,

        /// Expiry date as YYYYMMDD
        #[arg(long)]
        expiry: u64,

        /// Where to write the record
        #[arg(long, default_value = "attribute.record")]
        out: PathBuf,
    },

    /// Prove possession of a certified attribute
    Prove {
        #[arg(long, default_value = "keys")]
        keys_dir: PathBuf,

        #[arg(long, default_value = "attribute.record")]
        record: PathBuf,

        /// Verification date as YYYYMMDD
        #[arg(long)]
        current_date: u64,

        #[arg(long)]
        authority_id: u32,

        #[arg(long)]
        attr_type: u32,

        /// Where to write the attestation
        #[arg(long, default_value = "attribute.attestation")]
        out: PathBuf,
    },

    /// Verify an attestation against the published keys
    Verify {
        #[arg(long, default_value = "keys")]
        keys_dir: PathBuf,

        #[arg(long, default_value = "attribute.attestation")]
        attestation: PathBuf,
    },

    /// Run the whole protocol in-process: certify, anchor, prove, release
    Demo,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("error: {e:#}");
        std::process::exit(exit_code_for(&e));
    }
}

/// sysexits-style codes so scripts can tell "your attribute does not
/// qualify" apart from operational faults.
fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ZkError>() {
        Some(ZkError::InvalidInput(_)) => 65,
        Some(ZkError::WitnessUnsatisfiable(_)) => 66,
        Some(ZkError::KeyArtifactMismatch { .. }) | Some(ZkError::MissingKeys(_)) => 69,
        _ => 70,
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Keygen { out } => keygen(out),
        Command::Whoami { seed } => {
            let identity = load_identity(seed.as_deref())?;
            println!("{}", identity.gid());
            Ok(())
        }
        Command::Setup {
            dir,
            policy_id,
            slots,
        } => setup(dir, policy_id, &slots),
        Command::Certify {
            value,
            authority_id,
            attr_type,
            expiry,
            out,
        } => certify(&value, authority_id, attr_type, expiry, out),
        Command::Prove {
            keys_dir,
            record,
            current_date,
            authority_id,
            attr_type,
            out,
        } => prove(keys_dir, record, current_date, authority_id, attr_type, out),
        Command::Verify {
            keys_dir,
            attestation,
        } => verify(keys_dir, attestation),
        Command::Demo => demo(),
    }
}

fn keygen(out: Option<PathBuf>) -> Result<()> {
    let identity = Identity::generate();
    let path = save_identity(&identity, out.as_deref())?;
    println!("gid:  {}", identity.gid());
    println!("seed: {}", path.display());
    Ok(())
}

fn setup(dir: PathBuf, policy_id: u64, slots: &[String]) -> Result<()> {
    let shape = parse_shape(policy_id, slots)?;
    let mut rng = thread_rng();

    CircuitKeys::setup_attribute(&mut rng)?.save(&dir)?;
    CircuitKeys::setup_policy(shape, &mut rng)?.save(&dir)?;
    CircuitKeys::setup_process(&mut rng)?.save(&dir)?;

    println!("key artifacts written to {}", dir.display());
    Ok(())
}

fn parse_shape(policy_id: u64, slots: &[String]) -> Result<PolicyShape> {
    if slots.len() != 2 {
        bail!("a policy shape has exactly two slots, got {}", slots.len());
    }
    let mut parsed = [PolicySlot {
        authority_id: 0,
        attr_type: 0,
    }; 2];
    for (slot, raw) in parsed.iter_mut().zip(slots) {
        let (authority, attr) = raw
            .split_once(':')
            .with_context(|| format!("slot '{raw}' is not authority_id:attr_type"))?;
        slot.authority_id = authority
            .parse()
            .with_context(|| format!("bad authority id in slot '{raw}'"))?;
        slot.attr_type = attr
            .parse()
            .with_context(|| format!("bad attribute type in slot '{raw}'"))?;
    }
    Ok(PolicyShape {
        policy_id,
        slots: parsed,
    })
}

fn certify(value: &str, authority_id: u32, attr_type: u32, expiry: u64, out: PathBuf) -> Result<()> {
    // Numeric values pass through; short text is packed into an integer
    let value = match value.parse::<u64>() {
        Ok(n) => n,
        Err(_) => encode_attr_value(value),
    };

    let record = AttributeRecord {
        secret: rand::random(),
        value,
        authority_id,
        attr_type,
        expiry,
    };
    let commitment = record.commit()?;

    let bytes = bincode::serialize(&record).context("failed to encode record")?;
    std::fs::write(&out, bytes)
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!("record:     {}", out.display());
    println!("commitment: {}", commitment.to_hex());
    Ok(())
}

fn prove(
    keys_dir: PathBuf,
    record_path: PathBuf,
    current_date: u64,
    authority_id: u32,
    attr_type: u32,
    out: PathBuf,
) -> Result<()> {
    let bytes = std::fs::read(&record_path)
        .with_context(|| format!("failed to read {}", record_path.display()))?;
    let record: AttributeRecord =
        bincode::deserialize(&bytes).context("record file is malformed")?;

    let keys = CircuitKeys::load(&keys_dir, CircuitKind::Attribute)?;
    let mut rng = thread_rng();
    let attestation = Attestation::prove_attribute(
        &keys,
        &record,
        current_date,
        authority_id,
        attr_type,
        &mut rng,
    )?;

    std::fs::write(&out, attestation.to_bytes()?)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("attestation: {}", out.display());
    Ok(())
}

fn verify(keys_dir: PathBuf, attestation_path: PathBuf) -> Result<()> {
    let bytes = std::fs::read(&attestation_path)
        .with_context(|| format!("failed to read {}", attestation_path.display()))?;
    let attestation = Attestation::from_bytes(&bytes)?;

    let keys = CircuitKeys::load(&keys_dir, attestation.kind)?;
    if attestation.verify(&keys)? {
        println!("accepted ({} circuit)", attestation.kind);
        Ok(())
    } else {
        eprintln!("rejected ({} circuit)", attestation.kind);
        std::process::exit(1);
    }
}

/// The whole lifecycle against in-process oracles: certification,
/// registry anchoring, on-chain verification, authority key release for
/// attribute and policy proofs, then a process-step proof.
fn demo() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(demo_inner())
}

async fn demo_inner() -> Result<()> {
    const TODAY: u64 = 2026_08_29;
    let mut rng = thread_rng();

    // Participants
    let requester = Identity::generate();
    let authority_identity = Identity::generate();
    println!("requester  {}", requester.gid());
    println!("authority  {}", authority_identity.gid());

    // Trusted setup
    let shape = PolicyShape {
        policy_id: 1,
        slots: [
            PolicySlot {
                authority_id: 1,
                attr_type: 1,
            },
            PolicySlot {
                authority_id: 2,
                attr_type: 2,
            },
        ],
    };
    let mut store = KeyStore::new();
    store.insert(CircuitKeys::setup_attribute(&mut rng)?);
    store.insert(CircuitKeys::setup_policy(shape, &mut rng)?);
    store.insert(CircuitKeys::setup_process(&mut rng)?);
    let store = Arc::new(store);

    // Certification: two attributes from two authorities
    let license = AttributeRecord {
        secret: rand::random(),
        value: encode_attr_value("MFR"),
        authority_id: 1,
        attr_type: 1,
        expiry: 2027_12_31,
    };
    let clearance = AttributeRecord {
        secret: rand::random(),
        value: 3,
        authority_id: 2,
        attr_type: 2,
        expiry: 2027_06_30,
    };

    let registry = CommitmentRegistry::new();
    registry
        .store_commitment(requester.gid(), 1, 1, license.commit()?)
        .await;
    registry
        .store_commitment(requester.gid(), 2, 2, clearance.commit()?)
        .await;
    println!("commitments anchored ({} entries)", registry.len().await);

    // Attribute proof, anchored on-chain
    let attr_keys = store.get(CircuitKind::Attribute)?;
    let attestation = Attestation::prove_attribute(&attr_keys, &license, TODAY, 1, 1, &mut rng)?;
    let verifier = OnChainVerifier::new(store.clone());
    let event = verifier.verify_on_chain(requester.gid(), &attestation).await?;
    println!(
        "on-chain accept: authority {} type {} commitment {}",
        event.authority_id, event.attr_type, event.commitment
    );

    // Key release over the wire protocol
    let (mut authority, _events) = Authority::new(
        AuthorityConfig::default(),
        authority_identity.clone(),
        store.clone(),
    );
    let request = AccessMessage::KeyRequest(KeyRequest {
        requester_gid: requester.gid(),
        process_instance_id: 900,
        circuit_kind: CircuitKind::Attribute,
        proof: attestation.proof_bytes()?,
        public_inputs: attestation.public_input_bytes()?,
    });
    match authority.handle_message(request) {
        AccessMessage::KeyResponse(resp) => {
            let expected = derive_key_share(authority_identity.seed(), &requester.gid(), 900);
            anyhow::ensure!(resp.key_share == expected.to_vec(), "key share mismatch");
            println!("key share released: {}...", &hex::encode(&resp.key_share)[..16]);
        }
        other => bail!("authority answered {} instead of releasing", other.message_type()),
    }

    // Policy proof: both attributes at once
    let policy_keys = store.get(CircuitKind::Policy)?;
    let policy_proof = Attestation::prove_policy(&policy_keys, [license, clearance], TODAY, &mut rng)?;
    anyhow::ensure!(policy_proof.verify(&policy_keys)?, "policy proof rejected");
    println!("policy conjunction holds");

    // Process step: advancing from step 2 to step 3
    let process_keys = store.get(CircuitKind::Process)?;
    let step = ProcessStep {
        step_secret: rand::random(),
        step_details: 4_200,
    };
    let step_proof = Attestation::prove_process(&process_keys, &step, 77, 3, 2, &mut rng)?;
    anyhow::ensure!(step_proof.verify(&process_keys)?, "process proof rejected");
    println!("process step transition verified");

    info!("demo complete");
    Ok(())
}
