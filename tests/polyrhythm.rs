use cacophony::dsl::{dsl, ParseError};
use cacophony::midi::{create_smf, write_smf, MidiSettings};
use cacophony::rhythm::{build_polyrhythm, Amplitude, Rhythm, RhythmError, Times};
use midly::{MidiMessage, Smf, TrackEventKind};
use num_rational::Rational64;

fn attacks(rhythm: &Rhythm) -> Vec<usize> {
    rhythm
        .canonical()
        .unwrap()
        .iter()
        .enumerate()
        .filter_map(|(tick, slot)| slot.map(|_| tick))
        .collect()
}

fn note_ons(smf: &Smf<'_>) -> usize {
    smf.tracks[1]
        .iter()
        .filter(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. }))
        .count()
}

#[test]
fn scores_with_timing_marks() {
    let primary = dsl::rhythm("| x x' x x' `x x' |").unwrap();
    let secondary = dsl::rhythm("| x' `x x' |").unwrap();
    let poly = build_polyrhythm(primary, vec![secondary]).unwrap();

    assert_eq!(poly.canonical().unwrap().len(), 60);
    assert_eq!(attacks(&poly), vec![0, 6, 13, 14, 20, 33, 37, 46, 53]);
    assert_eq!(poly.duration(), Rational64::from_integer(6));
}

#[test]
fn four_over_three_from_scores() {
    let poly = build_polyrhythm(
        dsl::rhythm("| x x x x |").unwrap(),
        vec![dsl::rhythm("| x x x |").unwrap()],
    )
    .unwrap();
    assert_eq!(attacks(&poly), vec![0, 3, 4, 6, 8, 9]);
    assert_eq!(poly.beats()[0].amplitude(), Amplitude(2.0));

    let (primary, secondaries) = dsl::ratio("4:3").unwrap();
    assert_eq!(Rhythm::poly(primary, secondaries).unwrap(), poly);
}

#[test]
fn polyrhythm_to_midi() {
    let (primary, secondaries) = dsl::ratio("3:2").unwrap();
    let poly = build_polyrhythm(primary, secondaries).unwrap().cycle(Times(2));

    let smf = create_smf(&poly, &MidiSettings::default());
    assert_eq!(smf.tracks.len(), 2);
    // ticks 0, 2, 3 and 4 of a six tick grid, played twice
    assert_eq!(note_ons(&smf), 2 * 4);

    let path = std::env::temp_dir().join("cacophony-polyrhythm-to-midi.mid");
    write_smf(&poly, &MidiSettings::default(), &path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let parsed = Smf::parse(&bytes).unwrap();
    assert_eq!(note_ons(&parsed), note_ons(&smf));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn errors_surface_from_every_layer() {
    assert_eq!(
        dsl::rhythm("| x ? |"),
        Err(ParseError::UnknownBeatSymbol { symbol: '?', position: 4 })
    );
    assert!(matches!(
        build_polyrhythm(Rhythm::even(Times(2)), vec![Rhythm::new(vec![])]),
        Err(RhythmError::EmptyComponent { index: 1 })
    ));
}
