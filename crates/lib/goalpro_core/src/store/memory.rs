//! In-process store for development and tests.
//!
//! Each user lives in one `DashMap` entry, so every single-record operation
//! (including [`CredentialStore::complete_password_reset`]) runs under that
//! entry's shard lock. Emails are claimed in a separate lowercase index
//! before a record is written, so two registrations cannot share one.
//! No method holds guards on two maps at once.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{CredentialStore, StoreError, StoreResult, UserDirectory};
use crate::models::auth::{Credential, ResetTicket, Role};
use crate::models::user::{
    NewTeam, NewUser, ProfileUpdate, Team, TeamDetail, TeamUpdate, UserProfile,
};

#[derive(Debug, Clone)]
struct StoredUser {
    profile: UserProfile,
    password_hash: String,
    reset: Option<ResetTicket>,
}

impl StoredUser {
    fn credential(&self) -> Credential {
        Credential {
            username: self.profile.username.clone(),
            email: self.profile.email.clone(),
            password_hash: self.password_hash.clone(),
            role: self.profile.role,
            reset: self.reset.clone(),
        }
    }
}

/// `DashMap`-backed store implementing both store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, StoredUser>,
    /// Lowercased email → owning username.
    emails: DashMap<String, String>,
    teams: DashMap<i64, Team>,
    next_team_id: AtomicI64,
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a user's role. Role changes are owned by admin tooling, not
    /// by the auth core; this exists for seeding.
    pub fn set_role(&self, username: &str, role: Role) -> StoreResult<()> {
        let mut user = self
            .users
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(format!("user {username}")))?;
        user.profile.role = role;
        Ok(())
    }

    /// Reserve `email` for `username`. `Ok(true)` when the claim is new,
    /// `Ok(false)` when `username` already held it.
    fn claim_email(&self, email: &str, username: &str) -> StoreResult<bool> {
        match self.emails.entry(email_key(email)) {
            Entry::Occupied(owner) if owner.get() != username => {
                Err(StoreError::Duplicate("email".into()))
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(username.to_string());
                Ok(true)
            }
        }
    }

    /// Drop `username`'s claim on `email` unless its stored record uses it.
    fn release_email(&self, email: &str, username: &str) {
        let key = email_key(email);
        let in_use = self
            .users
            .get(username)
            .is_some_and(|u| email_key(&u.profile.email) == key);
        if !in_use {
            self.emails.remove_if(&key, |_, owner| owner == username);
        }
    }

    fn coached_team(&self, username: &str) -> Option<i64> {
        self.teams
            .iter()
            .find(|t| t.coach_username.as_deref() == Some(username))
            .map(|t| t.id)
    }

    fn set_coach_team(&self, username: &str, team_id: Option<i64>) {
        if let Some(mut user) = self.users.get_mut(username) {
            user.profile.coach_team_id = team_id;
        }
    }

    fn sorted(mut profiles: Vec<UserProfile>) -> Vec<UserProfile> {
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        profiles
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Credential>> {
        Ok(self.users.get(username).map(|u| u.credential()))
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<Credential>> {
        Ok(self
            .users
            .iter()
            .find(|u| {
                u.reset
                    .as_ref()
                    .is_some_and(|ticket| ticket.token_hash == token_hash)
            })
            .map(|u| u.credential()))
    }

    async fn update_password_hash(&self, username: &str, password_hash: &str) -> StoreResult<()> {
        if let Some(mut user) = self.users.get_mut(username) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn set_reset_token(&self, username: &str, ticket: &ResetTicket) -> StoreResult<()> {
        if let Some(mut user) = self.users.get_mut(username) {
            user.reset = Some(ticket.clone());
        }
        Ok(())
    }

    async fn clear_reset_token(&self, username: &str) -> StoreResult<()> {
        if let Some(mut user) = self.users.get_mut(username) {
            user.reset = None;
        }
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        username: &str,
        token_hash: &str,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let Some(mut user) = self.users.get_mut(username) else {
            return Ok(false);
        };
        let holds_ticket = user
            .reset
            .as_ref()
            .is_some_and(|ticket| ticket.token_hash == token_hash);
        if !holds_ticket {
            return Ok(false);
        }
        user.reset = None;
        user.password_hash = password_hash.to_string();
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> StoreResult<UserProfile> {
        let claimed = self.claim_email(&user.email, &user.username)?;
        if let Entry::Vacant(slot) = self.users.entry(user.username.clone()) {
            let profile = UserProfile {
                username: user.username.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                email: user.email.clone(),
                birth_date: user.birth_date,
                description: user.description.clone(),
                role: user.role,
                team_id: None,
                coach_team_id: None,
            };
            slot.insert(StoredUser {
                profile: profile.clone(),
                password_hash: user.password_hash.clone(),
                reset: None,
            });
            return Ok(profile);
        }
        if claimed {
            self.release_email(&user.email, &user.username);
        }
        Err(StoreError::Duplicate("username".into()))
    }

    async fn get_profile(&self, username: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.users.get(username).map(|u| u.profile.clone()))
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        Ok(Self::sorted(
            self.users.iter().map(|u| u.profile.clone()).collect(),
        ))
    }

    async fn list_by_role(&self, role: Role) -> StoreResult<Vec<UserProfile>> {
        Ok(Self::sorted(
            self.users
                .iter()
                .filter(|u| u.profile.role == role)
                .map(|u| u.profile.clone())
                .collect(),
        ))
    }

    async fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<UserProfile>> {
        let claimed = match &update.email {
            Some(email) => self.claim_email(email, username)?,
            None => false,
        };
        let (profile, previous_email) = {
            let Some(mut user) = self.users.get_mut(username) else {
                if let Some(email) = &update.email
                    && claimed
                {
                    self.release_email(email, username);
                }
                return Ok(None);
            };
            let previous_email = user.profile.email.clone();
            let profile = &mut user.profile;
            if let Some(v) = &update.first_name {
                profile.first_name = v.clone();
            }
            if let Some(v) = &update.last_name {
                profile.last_name = v.clone();
            }
            if let Some(v) = &update.email {
                profile.email = v.clone();
            }
            if let Some(v) = update.birth_date {
                profile.birth_date = v;
            }
            if let Some(v) = &update.description {
                profile.description = Some(v.clone());
            }
            let profile = profile.clone();
            if let Some(hash) = &update.password_hash {
                user.password_hash = hash.clone();
            }
            (profile, previous_email)
        };
        if update.email.is_some() {
            self.release_email(&previous_email, username);
        }
        Ok(Some(profile))
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        let mut teams: Vec<Team> = self.teams.iter().map(|t| t.value().clone()).collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }

    async fn create_team(&self, team: &NewTeam) -> StoreResult<Team> {
        if self.teams.iter().any(|t| t.name == team.name) {
            return Err(StoreError::Duplicate("team name".into()));
        }
        if let Some(coach) = &team.coach_username
            && self.coached_team(coach).is_some()
        {
            return Err(StoreError::Duplicate("coach".into()));
        }
        let id = self.next_team_id.fetch_add(1, Ordering::SeqCst) + 1;
        let team = Team {
            id,
            name: team.name.clone(),
            description: team.description.clone(),
            coach_username: team.coach_username.clone(),
        };
        self.teams.insert(id, team.clone());
        if let Some(coach) = &team.coach_username {
            self.set_coach_team(coach, Some(id));
        }
        Ok(team)
    }

    async fn get_team(&self, team_id: i64) -> StoreResult<Option<TeamDetail>> {
        let Some(team) = self.teams.get(&team_id).map(|t| t.value().clone()) else {
            return Ok(None);
        };
        let coach = team
            .coach_username
            .as_deref()
            .and_then(|coach| self.users.get(coach).map(|u| u.profile.clone()));
        let players = Self::sorted(
            self.users
                .iter()
                .filter(|u| u.profile.team_id == Some(team_id))
                .map(|u| u.profile.clone())
                .collect(),
        );
        Ok(Some(TeamDetail {
            team,
            coach,
            players,
        }))
    }

    async fn update_team(&self, team_id: i64, update: &TeamUpdate) -> StoreResult<Option<Team>> {
        if let Some(name) = &update.name
            && self.teams.iter().any(|t| t.id != team_id && &t.name == name)
        {
            return Err(StoreError::Duplicate("team name".into()));
        }
        let Some(mut team) = self.teams.get_mut(&team_id) else {
            return Ok(None);
        };
        if let Some(v) = &update.name {
            team.name = v.clone();
        }
        if let Some(v) = &update.description {
            team.description = v.clone();
        }
        Ok(Some(team.clone()))
    }

    async fn switch_coach(&self, team_id: i64, username: &str) -> StoreResult<Team> {
        if !self.users.contains_key(username) {
            return Err(StoreError::NotFound(format!("user {username}")));
        }
        match self.coached_team(username) {
            Some(id) if id == team_id => {}
            Some(_) => return Err(StoreError::Duplicate("coach".into())),
            None => {}
        }
        let (team, previous) = {
            let mut team = self
                .teams
                .get_mut(&team_id)
                .ok_or_else(|| StoreError::NotFound(format!("team {team_id}")))?;
            let previous = team.coach_username.replace(username.to_string());
            (team.clone(), previous)
        };
        if let Some(previous) = previous.filter(|p| p != username) {
            self.set_coach_team(&previous, None);
        }
        self.set_coach_team(username, Some(team_id));
        Ok(team)
    }

    async fn assign_player(&self, team_id: i64, username: &str) -> StoreResult<UserProfile> {
        if !self.teams.contains_key(&team_id) {
            return Err(StoreError::NotFound(format!("team {team_id}")));
        }
        let mut user = self
            .users
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(format!("user {username}")))?;
        if user.profile.team_id == Some(team_id) {
            return Err(StoreError::Duplicate("roster entry".into()));
        }
        user.profile.team_id = Some(team_id);
        if user.profile.role == Role::User {
            user.profile.role = Role::Player;
        }
        Ok(user.profile.clone())
    }

    async fn remove_player(&self, team_id: i64, username: &str) -> StoreResult<UserProfile> {
        let mut user = self
            .users
            .get_mut(username)
            .filter(|u| u.profile.team_id == Some(team_id))
            .ok_or_else(|| StoreError::NotFound(format!("user {username} on team {team_id}")))?;
        user.profile.team_id = None;
        Ok(user.profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};

    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            birth_date: NaiveDate::from_ymd_opt(1995, 4, 12).unwrap(),
            description: None,
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_rejected() {
        let store = MemoryStore::new();
        store
            .create_user(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .create_user(&new_user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref w) if w == "username"));

        let err = store
            .create_user(&new_user("alicia", "ALICE@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref w) if w == "email"));
    }

    #[tokio::test]
    async fn reset_ticket_is_overwritten_and_found_by_digest() {
        let store = MemoryStore::new();
        store
            .create_user(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();
        let expires_at = Utc::now();
        for digest in ["first", "second"] {
            store
                .set_reset_token(
                    "alice",
                    &ResetTicket {
                        token_hash: digest.into(),
                        expires_at,
                    },
                )
                .await
                .unwrap();
        }
        assert!(store.find_by_reset_token("first").await.unwrap().is_none());
        let cred = store.find_by_reset_token("second").await.unwrap().unwrap();
        assert_eq!(cred.username, "alice");
    }

    #[tokio::test]
    async fn complete_password_reset_succeeds_once() {
        let store = MemoryStore::new();
        store
            .create_user(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();
        store
            .set_reset_token(
                "alice",
                &ResetTicket {
                    token_hash: "digest".into(),
                    expires_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        assert!(
            store
                .complete_password_reset("alice", "digest", "new-hash")
                .await
                .unwrap()
        );
        assert!(
            !store
                .complete_password_reset("alice", "digest", "other-hash")
                .await
                .unwrap()
        );
        let cred = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(cred.password_hash, "new-hash");
        assert!(cred.reset.is_none());
    }

    #[tokio::test]
    async fn roster_assignment_promotes_plain_users_only() {
        let store = MemoryStore::new();
        store
            .create_user(&new_user("pete", "pete@example.com"))
            .await
            .unwrap();
        store
            .create_user(&new_user("carla", "carla@example.com"))
            .await
            .unwrap();
        store.set_role("carla", Role::Coach).unwrap();
        let team = store
            .create_team(&NewTeam {
                name: "Lions".into(),
                description: "".into(),
                coach_username: Some("carla".into()),
            })
            .await
            .unwrap();

        let pete = store.assign_player(team.id, "pete").await.unwrap();
        assert_eq!(pete.role, Role::Player);
        assert_eq!(pete.team_id, Some(team.id));

        let carla = store.assign_player(team.id, "carla").await.unwrap();
        assert_eq!(carla.role, Role::Coach);

        let err = store.assign_player(team.id, "pete").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let err = store.assign_player(team.id + 10, "pete").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let pete = store.remove_player(team.id, "pete").await.unwrap();
        assert_eq!(pete.team_id, None);
        assert_eq!(pete.role, Role::Player);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_cannot_share_an_email() {
        let store = Arc::new(MemoryStore::new());
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .create_user(&new_user(&format!("user{i}"), "Shared@Example.com"))
                        .await
                })
            })
            .collect();
        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, StoreError::Duplicate(ref w) if w == "email")),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn email_change_frees_the_old_address() {
        let store = MemoryStore::new();
        store
            .create_user(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();
        store
            .create_user(&new_user("bob", "bob@example.com"))
            .await
            .unwrap();

        let taken = ProfileUpdate {
            email: Some("BOB@example.com".into()),
            ..ProfileUpdate::default()
        };
        let err = store.update_profile("alice", &taken).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let moved = ProfileUpdate {
            email: Some("alice@elsewhere.org".into()),
            ..ProfileUpdate::default()
        };
        store.update_profile("alice", &moved).await.unwrap().unwrap();
        store
            .create_user(&new_user("alicia", "alice@example.com"))
            .await
            .unwrap();

        let recase = ProfileUpdate {
            email: Some("Alice@Elsewhere.org".into()),
            ..ProfileUpdate::default()
        };
        store.update_profile("alice", &recase).await.unwrap().unwrap();
        let err = store
            .create_user(&new_user("mallory", "alice@elsewhere.org"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref w) if w == "email"));
    }

    #[tokio::test]
    async fn username_clash_does_not_leak_an_email_claim() {
        let store = MemoryStore::new();
        store
            .create_user(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();
        store
            .create_user(&new_user("alice", "fresh@example.com"))
            .await
            .unwrap_err();
        store
            .create_user(&new_user("frank", "fresh@example.com"))
            .await
            .unwrap();
    }

    async fn lions_with_coach(store: &MemoryStore) -> Team {
        for name in ["carla", "cody", "pete", "paula"] {
            store
                .create_user(&new_user(name, &format!("{name}@example.com")))
                .await
                .unwrap();
        }
        store.set_role("carla", Role::Coach).unwrap();
        store.set_role("cody", Role::Coach).unwrap();
        store
            .create_team(&NewTeam {
                name: "Lions".into(),
                description: "".into(),
                coach_username: Some("carla".into()),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn team_detail_lists_coach_and_players() {
        let store = MemoryStore::new();
        let team = lions_with_coach(&store).await;
        store.assign_player(team.id, "pete").await.unwrap();
        store.assign_player(team.id, "paula").await.unwrap();

        let detail = store.get_team(team.id).await.unwrap().unwrap();
        assert_eq!(detail.team, team);
        let coach = detail.coach.unwrap();
        assert_eq!(coach.username, "carla");
        assert_eq!(coach.coach_team_id, Some(team.id));
        let players: Vec<_> = detail.players.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(players, ["paula", "pete"]);

        assert!(store.get_team(team.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn team_update_is_partial_and_keeps_names_unique() {
        let store = MemoryStore::new();
        let lions = lions_with_coach(&store).await;
        store
            .create_team(&NewTeam {
                name: "Tigers".into(),
                description: "".into(),
                coach_username: None,
            })
            .await
            .unwrap();

        let updated = store
            .update_team(
                lions.id,
                &TeamUpdate {
                    description: Some("Founded 1990".into()),
                    ..TeamUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Lions");
        assert_eq!(updated.description, "Founded 1990");

        let err = store
            .update_team(
                lions.id,
                &TeamUpdate {
                    name: Some("Tigers".into()),
                    ..TeamUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(
            store
                .update_team(99, &TeamUpdate::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn switching_coach_moves_the_coached_team() {
        let store = MemoryStore::new();
        let team = lions_with_coach(&store).await;

        let team = store.switch_coach(team.id, "cody").await.unwrap();
        assert_eq!(team.coach_username.as_deref(), Some("cody"));
        let carla = store.get_profile("carla").await.unwrap().unwrap();
        let cody = store.get_profile("cody").await.unwrap().unwrap();
        assert_eq!(carla.coach_team_id, None);
        assert_eq!(cody.coach_team_id, Some(team.id));
        assert_eq!(cody.current_team_id(), Some(team.id));

        let other = store
            .create_team(&NewTeam {
                name: "Tigers".into(),
                description: "".into(),
                coach_username: None,
            })
            .await
            .unwrap();
        let err = store.switch_coach(other.id, "cody").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref w) if w == "coach"));
        let err = store.switch_coach(other.id, "nobody").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = store.switch_coach(99, "carla").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
