// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::{sync::Arc, time::Duration};

use common::*;
use omx::{
    Command, CommandKind, Component, ComponentConfig, Driver, Error, ErrorCode, Event, EventKind,
    State, Timeouts, Tunnel,
};

fn pair() -> (Arc<SimulatedDriver>, Component, Component) {
    setup_logging();
    let driver = Arc::new(SimulatedDriver::new());
    let decoder = Component::open(driver.clone(), DECODER, test_config()).unwrap();
    let encoder = Component::open(driver.clone(), ENCODER, test_config()).unwrap();
    (driver, decoder, encoder)
}

#[test]
fn establish_brings_both_ends_to_idle_with_ports_enabled() {
    let (driver, decoder, encoder) = pair();
    let source = decoder.handle().unwrap();
    let destination = encoder.handle().unwrap();

    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    assert!(!tunnel.is_established());
    tunnel.establish(false).unwrap();

    assert!(tunnel.is_established());
    assert_eq!(decoder.state(), State::Idle);
    assert_eq!(encoder.state(), State::Idle);
    assert!(decoder.is_port_enabled(131));
    assert!(encoder.is_port_enabled(200));
    assert!(driver.port_enabled(source, 131));
    assert!(driver.port_enabled(destination, 200));
    assert_eq!(driver.tunnel_from(source, 131), Some((destination, 200)));
}

#[test]
fn handshake_order_is_fixed() {
    let (driver, decoder, encoder) = pair();
    let source = decoder.handle().unwrap();
    let destination = encoder.handle().unwrap();
    let source_before = driver.command_count(source);
    let destination_before = driver.command_count(destination);

    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(false).unwrap();

    assert_eq!(
        driver.commands(source)[source_before..],
        [Command::StateSet(State::Idle), Command::PortEnable(131)]
    );
    assert_eq!(
        driver.commands(destination)[destination_before..],
        [Command::PortEnable(200), Command::StateSet(State::Idle)]
    );
}

#[test]
fn establishing_twice_sends_nothing() {
    let (driver, decoder, encoder) = pair();
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(false).unwrap();

    let sent = driver.total_commands();
    tunnel.establish(false).unwrap();
    assert_eq!(driver.total_commands(), sent);
}

#[test]
fn port_settings_change_is_awaited() {
    let (driver, decoder, encoder) = pair();
    let source = decoder.handle().unwrap();
    driver.post_event(source, Event::new(EventKind::PortSettingsChanged, 131, 0));

    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(true).unwrap();
    assert!(tunnel.is_established());
}

#[test]
fn missing_port_settings_change_times_out() {
    let (_driver, decoder, encoder) = pair();
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    assert!(matches!(tunnel.establish(true), Err(Error::Timeout)));
    assert!(!tunnel.is_established());
}

/// Like [`pair`], with an event bound long enough to post into from
/// another thread.
fn patient_pair() -> (Arc<SimulatedDriver>, Component, Component) {
    setup_logging();
    let config = ComponentConfig {
        timeouts: Timeouts {
            event: Duration::from_secs(2),
            ..test_config().timeouts
        },
        ..test_config()
    };
    let driver = Arc::new(SimulatedDriver::new());
    let decoder = Component::open(driver.clone(), DECODER, config.clone()).unwrap();
    let encoder = Component::open(driver.clone(), ENCODER, config).unwrap();
    (driver, decoder, encoder)
}

#[test]
fn teardown_awaits_port_settings_change_before_disabling() {
    let (driver, decoder, encoder) = patient_pair();
    let source = decoder.handle().unwrap();
    driver.post_event(source, Event::new(EventKind::PortSettingsChanged, 131, 0));
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(true).unwrap();
    let before = driver.command_count(source);

    let seen_at_post = std::thread::scope(|scope| {
        let poster = scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(60));
            let seen = driver.command_count(source);
            driver.post_event(source, Event::new(EventKind::PortSettingsChanged, 131, 0));
            seen
        });
        tunnel.deestablish(false).unwrap();
        poster.join().unwrap()
    });

    assert_eq!(seen_at_post, before);
    assert_eq!(
        driver.commands(source)[before..],
        [Command::PortDisable(131)]
    );
    // The teardown consumed the event.
    let leftover = decoder.wait_for_event(EventKind::PortSettingsChanged, Duration::ZERO);
    assert!(leftover.is_err_and(|err| err.is_timeout()));
}

#[test]
fn no_wait_teardown_leaves_port_settings_change_alone() {
    let (driver, decoder, encoder) = pair();
    let source = decoder.handle().unwrap();
    driver.post_event(source, Event::new(EventKind::PortSettingsChanged, 131, 0));
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(true).unwrap();

    driver.post_event(source, Event::new(EventKind::PortSettingsChanged, 131, 0));
    tunnel.deestablish(true).unwrap();
    assert!(!tunnel.is_established());
    decoder
        .wait_for_event(EventKind::PortSettingsChanged, Duration::ZERO)
        .unwrap();
}

#[test]
fn idle_destination_gets_no_state_change() {
    let (driver, decoder, encoder) = pair();
    let destination = encoder.handle().unwrap();
    encoder.set_state(State::Idle).unwrap();
    let before = driver.command_count(destination);

    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(false).unwrap();
    assert_eq!(
        driver.commands(destination)[before..],
        [Command::PortEnable(200)]
    );
}

#[test]
fn destination_state_is_sampled_before_the_enable_wait() {
    let (driver, decoder, encoder) = pair();
    let source = decoder.handle().unwrap();
    let destination = encoder.handle().unwrap();
    encoder.set_state(State::Idle).unwrap();
    driver.set_faults(Faults {
        stall: Some(CommandKind::PortEnable),
        ..Faults::default()
    });
    let before = driver.command_count(destination);

    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    std::thread::scope(|scope| {
        scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(60));
            // The destination falls back to Loaded while its enable is outstanding.
            driver
                .send_command(destination, Command::StateSet(State::Loaded))
                .unwrap();
            driver.set_faults(Faults::default());
            driver.post_event(
                destination,
                Event::command_complete(CommandKind::PortEnable, 200),
            );
            driver.post_event(source, Event::command_complete(CommandKind::PortEnable, 131));
        });
        tunnel.establish(false).unwrap();
    });

    assert!(tunnel.is_established());
    assert!(
        !driver.commands(destination)[before..].contains(&Command::StateSet(State::Idle))
    );
}

#[test]
fn deestablish_unbinds_both_ends() {
    let (driver, decoder, encoder) = pair();
    let source = decoder.handle().unwrap();
    let destination = encoder.handle().unwrap();

    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(false).unwrap();
    tunnel.deestablish(false).unwrap();

    assert!(!tunnel.is_established());
    assert!(!decoder.is_port_enabled(131));
    assert!(!encoder.is_port_enabled(200));
    assert_eq!(driver.unbinds(), vec![(source, 131), (destination, 200)]);
    assert_eq!(driver.tunnel_from(source, 131), None);
}

#[test]
fn deestablish_without_establish_does_nothing() {
    let (driver, decoder, encoder) = pair();
    let sent = driver.total_commands();
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.deestablish(false).unwrap();
    drop(tunnel);

    assert_eq!(driver.total_commands(), sent);
    assert!(driver.unbinds().is_empty());
}

#[test]
fn unbind_from_stopped_component_is_tolerated() {
    let (driver, decoder, encoder) = pair();
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(false).unwrap();

    driver.set_faults(Faults {
        unbind: Some(ErrorCode::INCORRECT_STATE_OPERATION),
        ..Faults::default()
    });
    tunnel.deestablish(true).unwrap();
    assert_eq!(driver.unbinds().len(), 2);
    assert!(!tunnel.is_established());
}

#[test]
fn other_unbind_errors_are_reported_after_both_ends() {
    let (driver, decoder, encoder) = pair();
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(false).unwrap();

    driver.set_faults(Faults {
        unbind: Some(ErrorCode::HARDWARE),
        ..Faults::default()
    });
    let result = tunnel.deestablish(true);
    assert!(matches!(
        result,
        Err(Error::DriverRejected(ErrorCode::HARDWARE))
    ));
    assert_eq!(driver.unbinds().len(), 2);

    // The tunnel is clean again, so dropping it sends nothing more.
    drop(tunnel);
    assert_eq!(driver.unbinds().len(), 2);
}

#[test]
fn dropping_an_established_tunnel_deestablishes_it() {
    let (driver, decoder, encoder) = pair();
    let source = decoder.handle().unwrap();
    {
        let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
        tunnel.establish(false).unwrap();
    }
    assert_eq!(driver.unbinds().len(), 2);
    assert_eq!(driver.tunnel_from(source, 131), None);
}

#[test]
fn rebinding_requires_teardown() {
    let (_driver, decoder, encoder) = pair();
    let mut tunnel = Tunnel::new();
    assert!(tunnel.source().is_none());
    assert!(matches!(
        tunnel.establish(false),
        Err(Error::InvalidState(_))
    ));

    tunnel.init(&decoder, 131, &encoder, 200).unwrap();
    tunnel.establish(false).unwrap();
    assert!(matches!(
        tunnel.init(&decoder, 131, &encoder, 201),
        Err(Error::InvalidState(_))
    ));

    tunnel.deestablish(false).unwrap();
    tunnel.init(&decoder, 131, &encoder, 201).unwrap();
    assert_eq!(tunnel.destination().map(|(_, port)| port), Some(201));
}

#[test]
fn flush_reaches_both_ports() {
    let (driver, decoder, encoder) = pair();
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(false).unwrap();
    tunnel.flush();

    assert!(
        driver
            .commands(decoder.handle().unwrap())
            .contains(&Command::Flush(131))
    );
    assert!(
        driver
            .commands(encoder.handle().unwrap())
            .contains(&Command::Flush(200))
    );
}

#[test]
fn buffers_after_tunnel_on_remaining_port() {
    let (driver, decoder, encoder) = pair();
    let mut tunnel = Tunnel::bind(&decoder, 131, &encoder, 200);
    tunnel.establish(false).unwrap();

    encoder.allocate_output_buffers(false).unwrap();
    encoder.run().unwrap();
    decoder.run().unwrap();
    assert_eq!(encoder.output_stats().allocated, 4);
    assert_eq!(driver.state_of(encoder.handle().unwrap()), Some(State::Executing));

    tunnel.deestablish(false).unwrap();
}
