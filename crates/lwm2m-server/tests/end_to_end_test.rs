//! End to End Scenarios
//!
//! Managers wired together the way a transport layer would use them:
//! - Bootstrap, then register with the provisioned credentials
//! - Concurrent registrations from many clients
//! - Registration payloads decoded with the core codecs

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use lwm2m_core::link::parse_core_links;
use lwm2m_core::model::LwM2mModel;
use lwm2m_core::{tlv, LwM2mNode, LwM2mPath, LwM2mResource};
use lwm2m_server::bootstrap::{SecurityMode, SecurityStoreAuthorizer, ServerConfig, ServerSecurity};
use lwm2m_server::prelude::*;
use tokio::test;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([192, 0, 2, 1], port))
}

#[test]
async fn test_bootstrap_then_register() -> anyhow::Result<()> {
    init_tracing();
    let clock = Arc::new(ManualClock::at_epoch());
    let bus = EventBus::new();
    let mut bootstrap_events = bus.filter().endpoint("meter-7");

    // Bootstrap over PSK
    let security_store = Arc::new(InMemorySecurityStore::new());
    security_store.add(SecurityInfo::psk("meter-7", "meter-7-bs", vec![0x42; 16]))?;
    let bootstrap = BootstrapSessionManager::new(
        Arc::new(SecurityStoreAuthorizer::new(security_store.clone())),
        Arc::new(DefaultConsistencyChecker),
        clock.clone(),
    )
    .with_event_bus(bus.clone());

    let identity = Identity::psk(addr(40000), "meter-7-bs");
    let BootstrapOutcome::Started(mut session) =
        bootstrap.begin(BootstrapRequest::new("meter-7"), identity)
    else {
        anyhow::bail!("bootstrap was declined");
    };
    bootstrap.delete(&mut session, "/")?;
    bootstrap.write_server(
        &mut session,
        0,
        ServerConfig {
            short_id: 101,
            lifetime: 300,
            binding: BindingMode::U | BindingMode::Q,
            ..Default::default()
        },
    )?;
    bootstrap.write_security(
        &mut session,
        1,
        ServerSecurity {
            uri: "coaps://dm.example.com:5684".to_string(),
            security_mode: SecurityMode::Psk,
            public_key_or_id: b"meter-7-dm".to_vec(),
            secret_key: vec![0x24; 16],
            server_id: Some(101),
            ..Default::default()
        },
    )?;
    let provisioned = bootstrap.finalize(&mut session)?;

    // The device management server learns the provisioned credentials
    let dm_security = provisioned
        .security_for_server(101)
        .ok_or_else(|| anyhow::anyhow!("no security for server 101"))?;
    let psk_identity = String::from_utf8(dm_security.public_key_or_id.clone())?;
    security_store.add(SecurityInfo::psk(
        "meter-7",
        psk_identity.clone(),
        dm_security.secret_key.clone(),
    ))?;

    // Register with the provisioned settings
    let server = &provisioned.servers[&0];
    let registrations = RegistrationManager::new(Arc::new(RegistrationStore::new()), clock.clone())
        .with_event_bus(bus.clone());
    let presence = Arc::new(PresenceService::new(clock.clone()));
    registrations.add_listener(presence.clone());

    let client = Identity::psk(addr(40001), psk_identity);
    let expected = security_store
        .get_by_endpoint("meter-7")
        .ok_or_else(|| anyhow::anyhow!("no security info for meter-7"))?;
    assert!(SecurityChecker.check_security_infos("meter-7", &client, &[expected]));
    assert!(!SecurityChecker.check_security_infos(
        "meter-7",
        &Identity::unsecure(addr(40002)),
        &security_store.all(),
    ));
    let registered = registrations.register(
        RegistrationRequest::new("meter-7", client)
            .with_lifetime(server.lifetime)
            .with_binding(server.binding)
            .with_object_links(parse_core_links("</1/0>,</3/0>,</3303/0>")?),
    )?;
    assert!(presence.is_client_awake(&registered.registration));

    let mut types = Vec::new();
    for _ in 0..3 {
        let (event, _) = bootstrap_events
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("event bus closed"))?;
        types.push(event.type_name());
    }
    assert_eq!(types, vec!["BootstrapStarted", "BootstrapFinalized", "Registered"]);
    Ok(())
}

#[test]
async fn test_concurrent_registrations() -> anyhow::Result<()> {
    init_tracing();
    let manager = Arc::new(RegistrationManager::new(
        Arc::new(RegistrationStore::new()),
        Arc::new(SystemClock),
    ));

    let tasks = (0..32u16).map(|i| {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager.register(
                RegistrationRequest::new(format!("device-{}", i % 16), Identity::unsecure(addr(i)))
                    .with_lifetime(60),
            )
        })
    });
    for result in join_all(tasks).await {
        result??;
    }

    // Each endpoint keeps exactly one registration
    let all = manager.all_registrations();
    assert_eq!(all.len(), 16);
    assert_eq!(manager.store().len(), 16);
    Ok(())
}

#[test]
async fn test_read_response_for_registered_object() -> anyhow::Result<()> {
    let manager = RegistrationManager::new(
        Arc::new(RegistrationStore::new()),
        Arc::new(ManualClock::at_epoch()),
    );
    let registration = manager
        .register(
            RegistrationRequest::new("dev", Identity::unsecure(addr(5683)))
                .with_object_links(parse_core_links("</3>;ver=1.1,</3/0>")?),
        )?
        .registration;
    assert_eq!(registration.supported_object_version(3), Some("1.1"));

    // A Read of /3/0/1 answered in TLV
    let model = LwM2mModel::core();
    let path = LwM2mPath::resource(3, 0, 1);
    let payload = [0xC5, 0x01, 0x68, 0x65, 0x6C, 0x6C, 0x6F];
    let node = tlv::decode(&payload, &path, &model)?;
    assert_eq!(node, LwM2mNode::Resource(LwM2mResource::single(1, "hello")));
    Ok(())
}
