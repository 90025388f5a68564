use super::{Store, StoreError, StoreResult};
use crate::types::*;
use chrono::{Duration, Utc};

impl Store {
    /// Idempotent join: an existing (session, name) row is reused with its
    /// score and join time intact, flipped back to connected. Returns the
    /// player and whether the row was created.
    pub async fn get_or_create_player(
        &self,
        session_id: &str,
        name: &str,
    ) -> StoreResult<(Player, bool)> {
        let mut tables = self.inner.write().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound);
        }

        if let Some(existing) = tables
            .players
            .values_mut()
            .find(|p| p.session_id == session_id && p.name == name)
        {
            existing.connected = true;
            existing.last_seen = Utc::now();
            return Ok((existing.clone(), false));
        }

        let now = Utc::now();
        let player = Player {
            id: Self::new_id(),
            session_id: session_id.to_string(),
            name: name.to_string(),
            score: 0,
            current_streak: 0,
            max_streak: 0,
            connected: true,
            last_seen: now,
            is_host: false,
            joined_at: now,
        };
        tables.players.insert(player.id.clone(), player.clone());
        Ok((player, true))
    }

    pub async fn player(&self, player_id: &str) -> StoreResult<Player> {
        self.inner
            .read()
            .await
            .players
            .get(player_id)
            .cloned()
            .ok_or(StoreError::PlayerNotFound)
    }

    /// Claim the host role. Fails unless the session currently has none;
    /// the player flag and the session link flip in the same unit.
    pub async fn set_host(&self, player_id: &str) -> StoreResult<Player> {
        let mut tables = self.inner.write().await;
        let session_id = tables
            .players
            .get(player_id)
            .map(|p| p.session_id.clone())
            .ok_or(StoreError::PlayerNotFound)?;
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound)?;

        if session.host.is_some() {
            return Err(StoreError::AlreadyHasHost);
        }
        session.host = Some(player_id.to_string());

        let player = tables
            .players
            .get_mut(player_id)
            .ok_or(StoreError::PlayerNotFound)?;
        player.is_host = true;
        Ok(player.clone())
    }

    /// Heartbeat: refresh last_seen and flip the player back to connected.
    pub async fn heartbeat(&self, player_id: &str) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        let player = tables
            .players
            .get_mut(player_id)
            .ok_or(StoreError::PlayerNotFound)?;
        player.last_seen = Utc::now();
        player.connected = true;
        Ok(())
    }

    pub async fn set_connected(&self, player_id: &str, connected: bool) -> StoreResult<Player> {
        let mut tables = self.inner.write().await;
        let player = tables
            .players
            .get_mut(player_id)
            .ok_or(StoreError::PlayerNotFound)?;
        player.connected = connected;
        Ok(player.clone())
    }

    pub async fn session_players(&self, session_id: &str) -> StoreResult<Vec<Player>> {
        let tables = self.inner.read().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound);
        }
        let mut players: Vec<Player> = tables
            .players
            .values()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        players.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(players)
    }

    pub async fn disconnected_players(&self, session_id: &str) -> StoreResult<Vec<Player>> {
        Ok(self
            .session_players(session_id)
            .await?
            .into_iter()
            .filter(|p| !p.connected)
            .collect())
    }

    /// Mark connected players whose last heartbeat is older than `ttl_secs`
    /// as disconnected. Returns the ids that flipped.
    pub async fn sweep_stale(&self, session_id: &str, ttl_secs: i64) -> StoreResult<Vec<PlayerId>> {
        let mut tables = self.inner.write().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound);
        }
        let cutoff = Utc::now() - Duration::seconds(ttl_secs);
        let mut flipped = Vec::new();
        for player in tables.players.values_mut() {
            if player.session_id == session_id && player.connected && player.last_seen < cutoff {
                player.connected = false;
                flipped.push(player.id.clone());
            }
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::super::quiz::tests::{sample_question, sample_quiz};
    use super::*;

    async fn session(store: &Store) -> GameSession {
        let quiz = store.create_quiz(sample_quiz()).await.unwrap();
        store
            .attach_questions(&quiz.id, vec![sample_question("q", 0)])
            .await
            .unwrap();
        store.create_session(&quiz.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_join_is_idempotent_per_name() {
        let store = Store::new();
        let s = session(&store).await;

        let (alice, created) = store.get_or_create_player(&s.id, "Alice").await.unwrap();
        assert!(created);

        // Reconnect under the same name: same row, same join time.
        store.set_connected(&alice.id, false).await.unwrap();
        let (again, created) = store.get_or_create_player(&s.id, "Alice").await.unwrap();
        assert!(!created);
        assert_eq!(again.id, alice.id);
        assert_eq!(again.joined_at, alice.joined_at);
        assert!(again.connected);

        let (bob, created) = store.get_or_create_player(&s.id, "Bob").await.unwrap();
        assert!(created);
        assert_ne!(bob.id, alice.id);
    }

    #[tokio::test]
    async fn test_set_host_once() {
        let store = Store::new();
        let s = session(&store).await;
        let (alice, _) = store.get_or_create_player(&s.id, "Alice").await.unwrap();
        let (bob, _) = store.get_or_create_player(&s.id, "Bob").await.unwrap();

        let host = store.set_host(&alice.id).await.unwrap();
        assert!(host.is_host);
        assert_eq!(
            store.session(&s.id).await.unwrap().host,
            Some(alice.id.clone())
        );

        assert!(matches!(
            store.set_host(&bob.id).await,
            Err(StoreError::AlreadyHasHost)
        ));
        // And the host may not claim twice either.
        assert!(matches!(
            store.set_host(&alice.id).await,
            Err(StoreError::AlreadyHasHost)
        ));
    }

    #[tokio::test]
    async fn test_sweep_stale_flips_old_players() {
        let store = Store::new();
        let s = session(&store).await;
        let (alice, _) = store.get_or_create_player(&s.id, "Alice").await.unwrap();
        let (bob, _) = store.get_or_create_player(&s.id, "Bob").await.unwrap();

        // Backdate Alice's heartbeat past the TTL.
        {
            let mut tables = store.inner.write().await;
            tables.players.get_mut(&alice.id).unwrap().last_seen =
                Utc::now() - Duration::seconds(30);
        }

        let flipped = store.sweep_stale(&s.id, 15).await.unwrap();
        assert_eq!(flipped, vec![alice.id.clone()]);
        assert!(!store.player(&alice.id).await.unwrap().connected);
        assert!(store.player(&bob.id).await.unwrap().connected);

        // Already-disconnected players are not reported again.
        assert!(store.sweep_stale(&s.id, 15).await.unwrap().is_empty());

        // A heartbeat brings Alice back.
        store.heartbeat(&alice.id).await.unwrap();
        assert!(store.player(&alice.id).await.unwrap().connected);
    }
}
