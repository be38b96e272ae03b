use deck_proto::player::{PlaybackState, PlayerState, PushEvent, PushEventError};

const STATE_JSON: &str = r#"{
  "volume": 23,
  "mute": false,
  "equalizer": { "bass": 0, "treble": 0, "loudness": true },
  "currentTrack": {
    "artist": "Khruangbin",
    "title": "Maria También",
    "album": "Con Todo El Mundo",
    "albumArtUri": "/getaa?s=1&u=x-sonos-spotify",
    "duration": 195,
    "uri": "x-sonos-spotify:spotify%3atrack%3a1",
    "type": "track",
    "stationName": "",
    "absoluteAlbumArtUri": "http://192.168.1.20:1400/getaa?s=1&u=x-sonos-spotify"
  },
  "nextTrack": { "artist": "", "title": "", "duration": 0 },
  "trackNo": 4,
  "elapsedTime": 61,
  "elapsedTimeFormatted": "00:01:01",
  "playbackState": "PLAYING",
  "playMode": { "repeat": "none", "shuffle": true, "crossfade": false }
}"#;

#[test]
fn full_state_payload_parses() {
    let state: PlayerState = serde_json::from_str(STATE_JSON).unwrap();
    assert_eq!(state.playback_state, PlaybackState::Playing);
    assert_eq!(state.volume_percent, 23);
    assert_eq!(state.elapsed_secs, 61);
    assert!(state.play_mode.shuffle);
    assert_eq!(state.current_track.artist, "Khruangbin");
    assert_eq!(state.current_track.duration_secs, 195);
    assert!(state
        .current_track
        .art_locator
        .starts_with("http://192.168.1.20:1400/"));
}

#[test]
fn transport_state_event_carries_full_state() {
    let body = format!(
        r#"{{ "type": "transport-state", "data": {{ "uuid": "RINCON_1", "roomName": "Kitchen", "state": {} }} }}"#,
        STATE_JSON
    );
    let event = PushEvent::from_slice(body.as_bytes()).unwrap();
    assert_eq!(event.room_name(), "Kitchen");
    match event {
        PushEvent::TransportState { state, .. } => {
            assert_eq!(state.playback_state, PlaybackState::Playing);
            assert_eq!(state.current_track.title, "Maria También");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn volume_change_event_parses() {
    let body = br#"{ "type": "volume-change", "data": { "uuid": "RINCON_1", "roomName": "Kitchen", "previousVolume": 20, "newVolume": 26 } }"#;
    let event = PushEvent::from_slice(body).unwrap();
    assert_eq!(
        event,
        PushEvent::VolumeChange {
            room_name: "Kitchen".to_string(),
            new_volume: 26,
            previous_volume: Some(20),
        }
    );
}

#[test]
fn malformed_payloads_are_errors_not_panics() {
    let missing_room = br#"{ "type": "volume-change", "data": { "newVolume": 3 } }"#;
    assert!(matches!(
        PushEvent::from_slice(missing_room),
        Err(PushEventError::Malformed(_))
    ));
    assert!(matches!(
        PushEvent::from_slice(b"not json"),
        Err(PushEventError::Malformed(_))
    ));
    assert!(matches!(
        PushEvent::from_slice(br#"{ "type": "mute-change", "data": {} }"#),
        Err(PushEventError::UnknownKind(_))
    ));
}
