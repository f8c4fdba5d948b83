use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    thread::scope,
};

use serde_json::{Value, json};

use crate::{
    envelope::{self, Section},
    error::Error,
    id::BitProfile,
    keys::KeyPair,
    rand::{RandSource, ThreadRandom},
    record::{Metadata, MutablePayload, Token},
    service::{MegaId, MegaIdConfig},
    time::{MEGAID_EPOCH, MonotonicClock, TimeSource},
};

const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MegaId>();
    assert_send_sync::<MegaId<MonotonicClock, ThreadRandom>>();
};

const EPOCH_MS: u64 = MEGAID_EPOCH.as_millis() as u64;

#[derive(Clone, Default)]
struct ManualTime {
    millis: Arc<AtomicU64>,
}

impl ManualTime {
    fn at(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource<u64> for ManualTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

struct FixedRand(u32);

impl RandSource<u32> for FixedRand {
    fn rand(&self) -> u32 {
        self.0
    }
}

fn obj(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn service_at(config: MegaIdConfig, keys: KeyPair, time: &ManualTime) -> MegaId<ManualTime, FixedRand> {
    MegaId::with_sources(config, keys, time.clone(), FixedRand(0xdead_beef)).unwrap()
}

#[test]
fn create_update_read_scenario() {
    let service = MegaId::new(MegaIdConfig::default(), KeyPair::random()).unwrap();

    let token = service
        .create(Some(obj(json!({"user": "a"}))), Some(obj(json!({"status": "pending"}))))
        .unwrap();
    let created = service.read(&token.to_string()).unwrap();

    let updated = service
        .update(&token.to_string(), obj(json!({"status": "approved"})))
        .unwrap();
    let record = service.read(&updated.to_string()).unwrap();

    assert_eq!(record.immutable_data, obj(json!({"user": "a"})));
    assert_eq!(record.mutable_data, obj(json!({"status": "approved"})));
    assert_eq!(record.megaid, created.megaid);
    assert_eq!(record.date_created, created.date_created);
    assert!(record.date_updated >= record.date_created);
}

#[test]
fn created_record_fields() {
    let time = ManualTime::at(1_000);
    let config = MegaIdConfig {
        instance_id: 9,
        ..MegaIdConfig::default()
    };
    let service = service_at(config, KeyPair::random(), &time);

    let record = service
        .read(&service.create(None, None).unwrap().to_string())
        .unwrap();

    assert_eq!(record.parts.timestamp, 1_000);
    assert_eq!(record.parts.instance_id, 9);
    assert_eq!(record.parts.sequence, 0);
    assert_eq!(record.date_created, EPOCH_MS + 1_000);
    assert_eq!(record.date_updated, record.date_created);
    assert_eq!(record.random_bits, 0xdead_beef);
    assert!(record.immutable_data.is_empty());
    assert!(record.mutable_data.is_empty());
}

#[test]
fn update_leaves_immutable_section_byte_identical() {
    let time = ManualTime::at(10);
    let service = service_at(MegaIdConfig::default(), KeyPair::random(), &time);

    let original = service
        .create(Some(obj(json!({"owner": "x", "n": [1, 2]}))), None)
        .unwrap();
    let mut current = original.clone();
    for step in 0..3 {
        time.set(20 + step);
        current = service
            .update(&current.to_string(), obj(json!({ "step": step })))
            .unwrap();
        assert_eq!(current.megaid, original.megaid);
        assert_eq!(current.immutable, original.immutable);
        assert_ne!(current.mutable, original.mutable);
    }

    let before = service.read(&original.to_string()).unwrap();
    let after = service.read(&current.to_string()).unwrap();
    assert_eq!(after.immutable_data, before.immutable_data);
    assert_eq!(after.date_created, before.date_created);
    assert_eq!(after.random_bits, before.random_bits);
    assert_eq!(after.date_updated, EPOCH_MS + 22);
}

#[test]
fn update_within_creation_tick_keeps_dates_equal() {
    let time = ManualTime::at(500);
    let service = service_at(MegaIdConfig::default(), KeyPair::random(), &time);

    let token = service.create(None, None).unwrap();
    let token = service.update(&token.to_string(), obj(json!({"a": 1}))).unwrap();
    let record = service.read(&token.to_string()).unwrap();
    assert_eq!(record.date_updated, record.date_created);
}

#[test]
fn date_updated_never_decreases() {
    let time = ManualTime::at(100);
    let service = service_at(MegaIdConfig::default(), KeyPair::random(), &time);

    let token = service.create(None, None).unwrap();
    time.set(150);
    let token = service.update(&token.to_string(), Metadata::new()).unwrap();
    assert_eq!(service.read(&token.to_string()).unwrap().date_updated, EPOCH_MS + 150);

    // Wall clock stepped back.
    time.set(120);
    let token = service.update(&token.to_string(), Metadata::new()).unwrap();
    assert_eq!(service.read(&token.to_string()).unwrap().date_updated, EPOCH_MS + 150);
}

#[test]
fn update_replaces_and_patch_merges() {
    let time = ManualTime::at(1);
    let service = service_at(MegaIdConfig::default(), KeyPair::random(), &time);
    let token = service
        .create(None, Some(obj(json!({"status": "pending", "tries": 1}))))
        .unwrap()
        .to_string();

    let replaced = service.update(&token, obj(json!({"status": "done"}))).unwrap();
    assert_eq!(
        service.read(&replaced.to_string()).unwrap().mutable_data,
        obj(json!({"status": "done"}))
    );

    let patched = service.patch(&token, obj(json!({"status": "done"}))).unwrap();
    assert_eq!(
        service.read(&patched.to_string()).unwrap().mutable_data,
        obj(json!({"status": "done", "tries": 1}))
    );
}

#[test]
fn default_metadata_fills_missing_immutable_data() {
    let defaults = obj(json!({"created_by": "MEGAID", "version": "2.0"}));
    let config = MegaIdConfig {
        default_metadata: Some(defaults.clone()),
        ..MegaIdConfig::default()
    };
    let time = ManualTime::at(1);
    let service = service_at(config, KeyPair::random(), &time);

    for input in [None, Some(Metadata::new())] {
        let token = service.create(input, None).unwrap();
        assert_eq!(service.read(&token.to_string()).unwrap().immutable_data, defaults);
    }

    let token = service.create(Some(obj(json!({"user": "b"}))), None).unwrap();
    assert_eq!(
        service.read(&token.to_string()).unwrap().immutable_data,
        obj(json!({"user": "b"}))
    );
}

#[test]
fn ids_increase_across_creates() {
    let time = ManualTime::at(5);
    let service = service_at(MegaIdConfig::default(), KeyPair::random(), &time);

    let a = service.create(None, None).unwrap();
    let b = service.create(None, None).unwrap();
    time.set(6);
    let c = service.create(None, None).unwrap();
    assert!(a.megaid < b.megaid && b.megaid < c.megaid);
}

#[test]
fn clock_regression_fails_create() {
    let time = ManualTime::at(50);
    let service = service_at(MegaIdConfig::default(), KeyPair::random(), &time);

    service.create(None, None).unwrap();
    time.set(40);
    assert_eq!(
        service.create(None, None),
        Err(Error::ClockRegression { last: 50, now: 40 })
    );
}

#[test]
fn tampered_token_is_rejected() {
    let service = MegaId::new(MegaIdConfig::default(), KeyPair::random()).unwrap();
    let token = service.create(Some(obj(json!({"role": "user"}))), None).unwrap();

    let mut forged = token.clone();
    let mut payload: Value = serde_json::from_slice(&forged.immutable.payload).unwrap();
    payload["immutable_data"]["role"] = json!("admin");
    forged.immutable.payload = serde_json::to_vec(&payload).unwrap();
    assert_eq!(
        service.read(&forged.to_string()),
        Err(Error::SignatureInvalid {
            section: Section::Immutable
        })
    );

    let mut forged = token.clone();
    forged.mutable.signature[0] ^= 0x80;
    assert_eq!(
        service.update(&forged.to_string(), Metadata::new()),
        Err(Error::SignatureInvalid {
            section: Section::Mutable
        })
    );
}

#[test]
fn shared_key_holder_cannot_forge_immutable_data() {
    let keys = KeyPair::random();
    let service = MegaId::new(MegaIdConfig::default(), keys.clone()).unwrap();
    let token = service.create(Some(obj(json!({"role": "user"}))), None).unwrap();

    // Re-sealing with some other admin key is the best a shared-key holder
    // can do.
    let attacker = KeyPair::new(KeyPair::random().admin().clone(), keys.shared().clone());
    let mut payload: Value = serde_json::from_slice(&token.immutable.payload).unwrap();
    payload["immutable_data"]["role"] = json!("admin");
    let forged = Token {
        immutable: envelope::seal_immutable(&payload, attacker.admin()).unwrap(),
        ..token
    };
    assert!(matches!(
        service.read(&forged.to_string()),
        Err(Error::SignatureInvalid { .. })
    ));
}

#[test]
fn sections_cannot_be_spliced_across_records() {
    let service = MegaId::new(MegaIdConfig::default(), KeyPair::random()).unwrap();
    let a = service.create(Some(obj(json!({"user": "a"}))), None).unwrap();
    let b = service
        .create(Some(obj(json!({"user": "b"}))), Some(obj(json!({"admin": true}))))
        .unwrap();

    let foreign_mutable = Token {
        mutable: b.mutable.clone(),
        ..a.clone()
    };
    assert_eq!(
        service.read(&foreign_mutable.to_string()),
        Err(Error::SignatureInvalid {
            section: Section::Mutable
        })
    );

    let relabelled = Token {
        megaid: b.megaid,
        ..a.clone()
    };
    assert_eq!(
        service.read(&relabelled.to_string()),
        Err(Error::SignatureInvalid {
            section: Section::Immutable
        })
    );
}

#[test]
fn forged_mutable_payload_for_other_id_is_rejected() {
    let keys = KeyPair::random();
    let service = MegaId::new(MegaIdConfig::default(), keys.clone()).unwrap();
    let token = service.create(None, None).unwrap();

    let other_id = crate::id::NumericId::from_raw(token.megaid.to_raw() + 1);
    let mutable = envelope::seal_mutable(
        &MutablePayload {
            megaid: other_id,
            date_updated: 0,
            mutable_data: Metadata::new(),
        },
        keys.shared(),
    )
    .unwrap();
    let forged = Token { mutable, ..token };
    assert!(matches!(
        service.read(&forged.to_string()),
        Err(Error::SignatureInvalid {
            section: Section::Mutable
        })
    ));
}

#[test]
fn tokens_do_not_verify_under_other_keys() {
    let ours = MegaId::new(MegaIdConfig::default(), KeyPair::random()).unwrap();
    let theirs = MegaId::new(MegaIdConfig::default(), KeyPair::random()).unwrap();
    let token = theirs.create(None, None).unwrap();
    assert!(matches!(
        ours.read(&token.to_string()),
        Err(Error::SignatureInvalid { .. })
    ));
}

#[test]
fn derived_keys_read_each_others_tokens() {
    let a = MegaId::new(MegaIdConfig::default(), MegaId::generate_keys(Some(b"recovery")).unwrap()).unwrap();
    let b = MegaId::new(MegaIdConfig::default(), MegaId::generate_keys(Some(b"recovery")).unwrap()).unwrap();
    let token = a.create(Some(obj(json!({"k": "v"}))), None).unwrap();
    assert_eq!(b.read(&token.to_string()).unwrap().immutable_data["k"], "v");
}

#[test]
fn malformed_tokens_are_distinguished() {
    let service = MegaId::new(MegaIdConfig::default(), KeyPair::random()).unwrap();
    for bad in ["", "not a token", "1:2", "x:e30.AA:e30.AA", "1:e30:e30.AA"] {
        assert!(
            matches!(service.read(bad), Err(Error::MalformedBlob { .. })),
            "{bad:?} should be malformed"
        );
    }
}

#[test]
fn profile_bounds_hold_for_issued_ids() {
    for profile in BitProfile::ALL {
        let config = MegaIdConfig {
            profile,
            instance_id: profile.max_instance_id(),
            ..MegaIdConfig::default()
        };
        let service = MegaId::new(config, KeyPair::random()).unwrap();
        let record = service
            .read(&service.create(None, None).unwrap().to_string())
            .unwrap();
        assert_eq!(record.parts.instance_id, profile.max_instance_id());
        assert!(record.megaid.to_raw() <= profile.max_id());
    }
    assert!(BitProfile::Bits52.max_id() <= (1 << 53) - 1);
    assert!(BitProfile::Bits32.max_id() <= u64::from(u32::MAX));
}

#[test]
fn ids_wider_than_profile_are_malformed() {
    let wide = MegaId::new(MegaIdConfig::default(), KeyPair::derive(b"k").unwrap()).unwrap();
    let narrow_config = MegaIdConfig {
        profile: BitProfile::Bits32,
        ..MegaIdConfig::default()
    };
    let narrow = MegaId::new(narrow_config, KeyPair::derive(b"k").unwrap()).unwrap();

    let token = wide.create(None, None).unwrap();
    assert!(token.megaid.to_raw() > BitProfile::Bits32.max_id());
    assert!(matches!(
        narrow.read(&token.to_string()),
        Err(Error::MalformedBlob { .. })
    ));
}

#[test]
fn instance_id_must_fit_profile() {
    let config = MegaIdConfig {
        profile: BitProfile::Bits32,
        instance_id: BitProfile::Bits32.max_instance_id() + 1,
        ..MegaIdConfig::default()
    };
    assert!(matches!(
        MegaId::new(config, KeyPair::random()),
        Err(Error::FieldOverflow {
            field: "instance_id",
            ..
        })
    ));
}

#[test]
fn decode_id_unpacks_bare_ids() {
    let time = ManualTime::at(0);
    let config = MegaIdConfig {
        profile: BitProfile::Bits52,
        ..MegaIdConfig::default()
    };
    let service = service_at(config, KeyPair::random(), &time);

    let id = BitProfile::Bits52.pack(86_400_000, 3, 17).unwrap();
    let decoded = service.decode_id(id.to_raw()).unwrap();
    assert_eq!(decoded.megaid, id);
    assert_eq!(
        (decoded.parts.timestamp, decoded.parts.instance_id, decoded.parts.sequence),
        (86_400_000, 3, 17)
    );
    assert_eq!(decoded.date_created, EPOCH_MS + 86_400_000);

    assert!(matches!(
        service.decode_id(1 << 52),
        Err(Error::FieldOverflow { field: "id", .. })
    ));
}

#[test]
fn one_service_is_shared_across_threads() {
    const THREADS: usize = 8;
    const RECORDS_PER_THREAD: usize = 300;

    let config = MegaIdConfig {
        profile: BitProfile::Bits32,
        ..MegaIdConfig::default()
    };
    let clock = MonotonicClock::with_epoch(config.epoch);
    let service = MegaId::with_sources(config, KeyPair::random(), clock, ThreadRandom).unwrap();
    let seen_ids = Mutex::new(HashSet::with_capacity(THREADS * RECORDS_PER_THREAD));

    scope(|s| {
        for worker in 0..THREADS {
            let service = &service;
            let seen_ids = &seen_ids;

            s.spawn(move || {
                for n in 0..RECORDS_PER_THREAD {
                    let token = service
                        .create(Some(obj(json!({"worker": worker}))), None)
                        .unwrap()
                        .to_string();
                    let updated = service
                        .update(&token, obj(json!({"n": n})))
                        .unwrap()
                        .to_string();

                    let record = service.read(&updated).unwrap();
                    assert_eq!(record.immutable_data["worker"], worker);
                    assert_eq!(record.mutable_data["n"], n);
                    assert!(seen_ids.lock().unwrap().insert(record.megaid));
                }
            });
        }
    });

    assert_eq!(seen_ids.lock().unwrap().len(), THREADS * RECORDS_PER_THREAD);
}
