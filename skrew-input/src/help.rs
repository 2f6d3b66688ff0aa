//! Help text shown by `h;` and `help;`

pub const CONTROLS: &str = "\
Controls:
  q;  quit            s;  save WAV + MP3
  p;  play/pause      l;  load another file
  u;  undo            r;  redo
  h;  help
Keys (--keys): Space play/pause on an empty line, Left/Right undo/redo,
Up restart playback, Enter submit, Esc clear line, Ctrl-C quit.
Instructions must end with ';'.";

pub const INSTRUCTIONS: &str = "\
Instructions (chain with ';', e.g. p:2;loop:2:8:4;):
  p:<semitones>                       pitch shift
  t:<rate>                            time stretch (rate > 1 is faster)
  rt:<rate>  a:<rate>                 resample-based speed change
  bpm:<target_bpm>                    stretch to a target tempo
  loop:<beats>:<length>:<repeat>      lock beat windows
  rev:<beats>:<length>:<repeat>       reverse beat windows
  chop:[beats:]<size>:<step>:<repeat> rearrange beats inside windows
  stut:[beats:]<count>:<length>:<repeat>
                                      repeat the first beat of windows
  echo:<delay>:<count>:<decay>        decaying echoes (seconds)
  mash:[beats:]<parts>:<beats_per_mash>:<repeat>
                                      shuffle window sub-parts
  mute:<threshold_db>                 keep loud spectral content, drum-shaped
  trig:<sensitivity>                  gate on detected onsets (0.0 - 1.0)
  n:<threshold_db>                    spectral gate keeping voice bands
  perc                                extract percussion
  copy:<start>:<count>                flatten samples to the value at start
  revert:<steps>                      undo (positive) or redo (negative) steps
  help                                show this text

Beat values go up to 4096, echo counts up to 1000, rates are kept in 0.1 - 10.";

/// Full help screen
pub fn help_text() -> String {
    format!("{}\n\n{}", INSTRUCTIONS, CONTROLS)
}
