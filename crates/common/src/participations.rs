use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role of an artist contribution on a track or album. Closed set: unknown
/// role names fail parsing instead of being carried as loose strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Artist,
    AlbumArtist,
    Composer,
    Conductor,
    Lyricist,
    Arranger,
    Producer,
    Director,
    Engineer,
    Mixer,
    Remixer,
    DjMixer,
    Performer,
}

impl Role {
    pub const ALL: [Role; 13] = [
        Role::Artist,
        Role::AlbumArtist,
        Role::Composer,
        Role::Conductor,
        Role::Lyricist,
        Role::Arranger,
        Role::Producer,
        Role::Director,
        Role::Engineer,
        Role::Mixer,
        Role::Remixer,
        Role::DjMixer,
        Role::Performer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Artist => "artist",
            Role::AlbumArtist => "album_artist",
            Role::Composer => "composer",
            Role::Conductor => "conductor",
            Role::Lyricist => "lyricist",
            Role::Arranger => "arranger",
            Role::Producer => "producer",
            Role::Director => "director",
            Role::Engineer => "engineer",
            Role::Mixer => "mixer",
            Role::Remixer => "remixer",
            Role::DjMixer => "dj_mixer",
            Role::Performer => "performer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleParseError(pub String);

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid role: {}", self.0)
    }
}

impl std::error::Error for RoleParseError {}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .find(|role| role.as_str() == value)
            .copied()
            .ok_or_else(|| RoleParseError(value.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
    pub sort_name: String,
}

/// Role-indexed artist contributions. Each owner holds its own copy; within a
/// role, artists stay in insertion order and duplicates (by id) are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participations(BTreeMap<Role, Vec<ArtistRef>>);

impl Participations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, role: Role, artists: impl IntoIterator<Item = ArtistRef>) {
        let entry = self.0.entry(role).or_default();
        for artist in artists {
            if !entry.iter().any(|existing| existing.id == artist.id) {
                entry.push(artist);
            }
        }
    }

    pub fn first(&self, role: Role) -> Option<&ArtistRef> {
        self.0.get(&role).and_then(|artists| artists.first())
    }

    pub fn get(&self, role: Role) -> &[ArtistRef] {
        self.0.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Role-wise union of `other` into `self`, deduplicated by artist id.
    pub fn merge(&mut self, other: &Participations) {
        for (role, artists) in &other.0 {
            self.add(*role, artists.iter().cloned());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &[ArtistRef])> {
        self.0.iter().map(|(role, artists)| (*role, artists.as_slice()))
    }

    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for artists in self.0.values() {
            for artist in artists {
                if !names.contains(&artist.name) {
                    names.push(artist.name.clone());
                }
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn artist(id: &str, name: &str) -> ArtistRef {
        ArtistRef {
            id: id.to_string(),
            name: name.to_string(),
            sort_name: name.to_lowercase(),
        }
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_fails_loudly() {
        assert!("vocalist".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn add_deduplicates_by_id_and_keeps_order() {
        let mut p = Participations::new();
        p.add(Role::Artist, [artist("1", "Ann"), artist("2", "Ben")]);
        p.add(Role::Artist, [artist("1", "Ann again"), artist("3", "Cy")]);
        let names: Vec<_> = p.get(Role::Artist).iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Ann", "Ben", "Cy"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut p = Participations::new();
        p.add(Role::Composer, [artist("1", "Ann"), artist("2", "Ben")]);
        let snapshot = p.clone();
        let other = p.clone();
        p.merge(&other);
        assert_eq!(p, snapshot);
    }

    #[test]
    fn merge_is_commutative_up_to_artist_ids() {
        let mut p1 = Participations::new();
        p1.add(Role::Artist, [artist("1", "Ann"), artist("2", "Ben")]);
        let mut p2 = Participations::new();
        p2.add(Role::Artist, [artist("3", "Cy"), artist("1", "Ann")]);

        let mut left = p1.clone();
        left.merge(&p2);
        let mut right = p2.clone();
        right.merge(&p1);

        let ids = |p: &Participations| -> HashSet<String> {
            p.get(Role::Artist).iter().map(|a| a.id.clone()).collect()
        };
        assert_eq!(ids(&left), ids(&right));
        assert_eq!(ids(&left).len(), 3);
    }

    #[test]
    fn first_returns_none_for_absent_role() {
        let p = Participations::new();
        assert!(p.first(Role::Conductor).is_none());
    }
}
