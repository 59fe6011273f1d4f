use std::path::Path;

use midly::{
    num::u15, num::u28, num::u4, num::u7, Format, Header, MetaMessage, MidiMessage, Smf, Track,
    TrackEvent, TrackEventKind,
};
use num_rational::Rational64;
use thiserror::Error;

use crate::rhythm::{Amplitude, Rhythm};

use super::time::{Delta, Tempo, Tick, TICKS_PER_QUARTER_NOTE};

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to write MIDI file: {0}")]
    Io(#[from] std::io::Error),
}

/// How a rhythm is performed. Every beat sounds the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiSettings {
    pub tempo: Tempo,
    pub key: u7,
    pub channel: u4,
    pub program: u7,
}

impl Default for MidiSettings {
    fn default() -> Self {
        MidiSettings {
            tempo: Tempo::default(),
            // A440
            key: u7::new(69),
            channel: u4::new(0),
            // Acoustic guitar (nylon)
            program: u7::new(24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventType {
    NoteOn(u7),
    NoteOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Event<T> {
    pub tick: T,
    pub event_type: EventType,
}

// Events are supposed to be sorted by T at all times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventGrid<T> {
    events: Vec<Event<T>>,
    length: Tick,
}

impl<T> IntoIterator for EventGrid<T> {
    type Item = Event<T>;
    type IntoIter = std::vec::IntoIter<Event<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<T> EventGrid<T> {
    fn new() -> Self {
        EventGrid {
            events: Vec::new(),
            length: Tick(0),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event<T>> {
        self.events.iter()
    }

    pub fn length(&self) -> Tick {
        self.length
    }
}

impl EventGrid<Tick> {
    /// Converts a sorted `EventGrid<Tick>` into time since the previous event.
    fn to_delta(&self) -> EventGrid<Delta> {
        let mut time = Tick(0);
        let mut delta_grid = EventGrid::new();
        for e in &self.events {
            let delta = e.tick - time;
            time = time + delta;
            delta_grid.events.push(Event {
                tick: Delta(delta.0 as u32),
                event_type: e.event_type,
            })
        }
        delta_grid.length = self.length;
        delta_grid
    }
}

/// Louder beats hit harder; anything audible gets at least velocity 1.
fn velocity(amplitude: Amplitude) -> u7 {
    u7::new((amplitude.0 * 127.0).ceil().clamp(1.0, 127.0) as u8)
}

/// Lays the beats out back to back. Each note sounds for its beat's sounding
/// time, after its start delay; rests only take up time.
fn flatten_rhythm(rhythm: &Rhythm) -> EventGrid<Tick> {
    let mut time = Rational64::from_integer(0);
    let mut grid = EventGrid::new();
    for beat in rhythm {
        if beat.amplitude().is_attack() {
            let note_on = time + beat.start_delay();
            let note_off = note_on + beat.sounding_time();
            grid.events.push(Event {
                tick: Tick::from_beats(note_on),
                event_type: EventType::NoteOn(velocity(beat.amplitude())),
            });
            grid.events.push(Event {
                tick: Tick::from_beats(note_off),
                event_type: EventType::NoteOff,
            });
        }
        time += beat.duration();
    }
    grid.length = Tick::from_beats(time);
    grid
}

fn meta_track<'a>(settings: &MidiSettings) -> Track<'a> {
    vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(settings.tempo.to_midi())),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(b"cacophony")),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]
}

fn notes_track<'a>(rhythm: &Rhythm, settings: &MidiSettings) -> Track<'a> {
    let grid = flatten_rhythm(rhythm);
    let last_event = grid.iter().last().map_or(Tick(0), |e| e.tick);
    let trailing = grid.length().max(last_event) - last_event;

    let mut track = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Cacophony")),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel: settings.channel,
                message: MidiMessage::ProgramChange {
                    program: settings.program,
                },
            },
        },
    ];
    for event in grid.to_delta() {
        let message = match event.event_type {
            EventType::NoteOn(vel) => MidiMessage::NoteOn {
                key: settings.key,
                vel,
            },
            EventType::NoteOff => MidiMessage::NoteOff {
                key: settings.key,
                vel: u7::new(0),
            },
        };
        track.push(TrackEvent {
            delta: u28::new(event.tick.0),
            kind: TrackEventKind::Midi {
                channel: settings.channel,
                message,
            },
        });
    }
    track.push(TrackEvent {
        delta: u28::new(trailing.0 as u32),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

// The length of a beat is not standard, so the tempo track carries a MetaMessage::Tempo event
// to fully describe the length of a MIDI tick.
pub fn create_smf<'a>(rhythm: &Rhythm, settings: &MidiSettings) -> Smf<'a> {
    let metrical = midly::Timing::Metrical(u15::new(TICKS_PER_QUARTER_NOTE));
    let tracks = vec![meta_track(settings), notes_track(rhythm, settings)];
    tracing::debug!(
        beats = rhythm.len(),
        events = tracks[1].len(),
        tempo = %settings.tempo,
        "created MIDI sequence"
    );
    Smf {
        header: Header {
            format: Format::Parallel,
            timing: metrical,
        },
        tracks,
    }
}

pub fn write_smf(rhythm: &Rhythm, settings: &MidiSettings, path: impl AsRef<Path>) -> Result<(), MidiError> {
    create_smf(rhythm, settings).save(path)?;
    Ok(())
}

#[cfg(test)]
use crate::rhythm::{Beat, Timing, Times};

#[cfg(test)]
fn note_ons(grid: &EventGrid<Tick>) -> Vec<Tick> {
    grid.iter()
        .filter(|e| matches!(e.event_type, EventType::NoteOn(_)))
        .map(|e| e.tick)
        .collect()
}

#[test]
fn test_velocity() {
    assert_eq!(velocity(Amplitude(1.0)), u7::new(127));
    assert_eq!(velocity(Amplitude(0.5)), u7::new(64));
    assert_eq!(velocity(Amplitude(2.0)), u7::new(127));
    assert_eq!(velocity(Amplitude(0.001)), u7::new(1));
}

#[test]
fn test_flatten_rhythm() {
    let grid = flatten_rhythm(&Rhythm::even(Times(2)));
    assert_eq!(
        grid,
        EventGrid {
            events: vec![
                Event {
                    tick: Tick(144),
                    event_type: EventType::NoteOn(u7::new(127))
                },
                Event {
                    tick: Tick(336),
                    event_type: EventType::NoteOff
                },
                Event {
                    tick: Tick(624),
                    event_type: EventType::NoteOn(u7::new(127))
                },
                Event {
                    tick: Tick(816),
                    event_type: EventType::NoteOff
                },
            ],
            length: Tick(960)
        }
    );
}

#[test]
fn test_flatten_rhythm_skips_rests() {
    let rhythm = Rhythm::new(vec![
        Beat::plain(Amplitude(1.0), 1).unwrap(),
        Beat::plain(Amplitude::REST, 1).unwrap(),
        Beat::plain(Amplitude(0.5), 2).unwrap(),
    ]);
    let grid = flatten_rhythm(&rhythm);
    assert_eq!(grid.iter().count(), 4);
    assert_eq!(note_ons(&grid), vec![Tick(144), Tick(960 + 288)]);
    assert_eq!(grid.length(), Tick(1920));
}

#[test]
fn test_flatten_rhythm_early_and_late() {
    let timed = |timing| Beat::new(Amplitude(1.0), Rational64::from_integer(1), timing).unwrap();
    let rhythm = Rhythm::new(vec![
        timed(Timing::ON_TIME),
        timed(Timing::ON_TIME),
        timed(Timing::EARLY),
        timed(Timing::ON_TIME),
        timed(Timing::LATE),
    ]);
    let starts = note_ons(&flatten_rhythm(&rhythm));
    let gaps: Vec<u64> = starts.windows(2).map(|w| (w[1] - w[0]).0).collect();
    assert!(gaps[1] < gaps[0]);
    assert!(gaps[2] > gaps[0]);
    assert_eq!(gaps[1] + gaps[2], 2 * gaps[0]);
    assert!(gaps[3] > gaps[0]);
}

#[test]
fn test_to_delta() {
    let grid = flatten_rhythm(&Rhythm::even(Times(2)));
    let deltas: Vec<Delta> = grid.to_delta().into_iter().map(|e| e.tick).collect();
    assert_eq!(deltas, vec![Delta(144), Delta(192), Delta(288), Delta(192)]);
}

#[test]
fn test_create_smf() {
    let smf = create_smf(&Rhythm::even(Times(3)), &MidiSettings::default());
    assert_eq!(smf.tracks.len(), 2);
    assert_eq!(smf.header.timing, midly::Timing::Metrical(u15::new(480)));

    let notes = &smf.tracks[1];
    // name, program change, 3 x (on, off), end of track
    assert_eq!(notes.len(), 9);
    assert_eq!(
        notes.last().map(|e| (e.delta, e.kind)),
        Some((u28::new(144), TrackEventKind::Meta(MetaMessage::EndOfTrack)))
    );

    let mut buf = Vec::new();
    smf.write(&mut buf).unwrap();
    let parsed = Smf::parse(&buf).unwrap();
    fn midi_events<'a>(track: &Track<'a>) -> Vec<(u28, TrackEventKind<'a>)> {
        track
            .iter()
            .filter(|e| matches!(e.kind, TrackEventKind::Midi { .. }))
            .map(|e| (e.delta, e.kind))
            .collect()
    }
    assert_eq!(parsed.tracks.len(), 2);
    assert_eq!(midi_events(&parsed.tracks[1]), midi_events(&smf.tracks[1]));
}
