//! Static track and sound catalogs.

use super::SongDescriptor;

/// Base location of the hosted background music.
const MUSIC_HOST: &str = "https://rhythora.us-lax-1.linodeobjects.com";

/// Compact catalog row: (name, author, file stem, length, bpm, offset).
type TrackRow = (&'static str, &'static str, &'static str, f64, f64, f64);

const TRACKS: [TrackRow; 13] = [
    ("triangles", "cYsmix", "triangles", 126.0, 160.0, 3.06),
    ("circles!", "nekodex", "circles!", 139.0, 184.0, 2.63),
    ("aureole", "nekodex", "aureole", 164.0, 70.0, 1.74),
    ("circle the halls", "nekodex", "circle the halls", 111.0, 172.0, 5.95),
    ("最後的灰燼", "Ds_Squid", "最後的灰燼", 114.0, 150.0, 0.27),
    ("終結？", "Ds_Squid", "終結？", 152.0, 83.0, 0.19),
    ("劫炎", "Ds_Squid", "劫炎", 94.0, 99.0, 0.19),
    ("即刻，現在！", "Ds_Squid", "即刻，現在！", 163.0, 108.0, 0.45),
    (
        "Artificial Chariot (SY91419 Arr.)",
        "SY91419",
        "Artificial Chariot (SY91419 Arr.)",
        196.0,
        80.0,
        0.02,
    ),
    ("athazagoraphobia", "igaveuponmusic", "athazagoraphobia", 187.0, 123.0, 17.26),
    ("moonbath (remix)", "igaveuponmusic", "moonbath (remix)", 96.0, 90.0, 2.70),
    ("Inverted World", "ARForest", "Inverted World", 131.0, 180.0, 0.04),
    // Triple time: charted at 130 rather than 195.
    ("The Last Page", "ARForest", "The Last Page", 143.0, 130.0, 7.43),
];

/// Background music rotation used by the menus.
pub static BACKGROUND_MUSIC: std::sync::LazyLock<Vec<SongDescriptor>> =
    std::sync::LazyLock::new(|| {
        TRACKS
            .iter()
            .map(|&(name, author, stem, length, bpm, offset)| SongDescriptor {
                name: name.to_string(),
                author: author.to_string(),
                mapper: "fengziya".to_string(),
                audio_url: format!("{MUSIC_HOST}/{stem}.mp3"),
                length,
                bpm,
                offset,
            })
            .collect()
    });

/// Logical keys for hitsounds and sound effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundKey {
    StableNormalHitnormal,
}

impl SoundKey {
    /// All keys, in catalog order.
    pub const ALL: [Self; 1] = [Self::StableNormalHitnormal];

    /// Stable string form, used in logs and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StableNormalHitnormal => "stable-normal-hitnormal",
        }
    }

    /// Parse the string form.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// Asset location of this sound.
    pub fn url(self) -> &'static str {
        SOUND_LIST
            .iter()
            .find_map(|(key, url)| (*key == self).then_some(*url))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for SoundKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hitsound and sound effect assets.
pub const SOUND_LIST: [(SoundKey, &str); 1] = [(
    SoundKey::StableNormalHitnormal,
    "/assets/samples/stable-normal-hitnormal.wav",
)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_music_catalog() {
        assert_eq!(BACKGROUND_MUSIC.len(), 13);
        let aureole = BACKGROUND_MUSIC
            .iter()
            .find(|song| song.name == "aureole")
            .unwrap();
        assert_eq!(aureole.author, "nekodex");
        assert_eq!(
            aureole.audio_url,
            "https://rhythora.us-lax-1.linodeobjects.com/aureole.mp3"
        );
        assert!((aureole.bpm - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_every_sound_key_has_url() {
        for key in SoundKey::ALL {
            assert!(!key.url().is_empty(), "{key} has no asset");
            assert_eq!(SoundKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(SoundKey::from_name("missing"), None);
    }
}
