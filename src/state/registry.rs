use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{dto::game::RoomSummary, services::dispatcher::GameHandle};

const NAME_ATTEMPTS: usize = 32;

#[derive(Default)]
struct Rooms {
    public: HashMap<String, GameHandle>,
    private: HashMap<String, GameHandle>,
}

impl Rooms {
    fn get(&self, name: &str) -> Option<&GameHandle> {
        self.public.get(name).or_else(|| self.private.get(name))
    }

    fn pool(&mut self, private: bool) -> &mut HashMap<String, GameHandle> {
        if private {
            &mut self.private
        } else {
            &mut self.public
        }
    }
}

/// Running games keyed by name, plus the player → game index used after the
/// websocket upgrade.
#[derive(Default)]
pub struct Registry {
    rooms: Mutex<Rooms>,
    players: DashMap<String, String>,
}

impl Registry {
    /// Pick a two-word game name that no running game uses.
    pub async fn fresh_name(&self) -> Option<String> {
        let rooms = self.rooms.lock().await;
        (0..NAME_ATTEMPTS)
            .filter_map(|_| petname::petname(2, "-"))
            .find(|name| rooms.get(name).is_none())
    }

    /// Register a running game. Returns `false` when the name is taken.
    pub async fn insert(&self, handle: GameHandle) -> bool {
        let mut rooms = self.rooms.lock().await;
        if rooms.get(handle.name()).is_some() {
            return false;
        }
        let name = handle.name().to_string();
        rooms.pool(handle.is_private()).insert(name, handle);
        true
    }

    /// A public game still in pre-game with a free seat, other than the `skip`ped ones.
    pub async fn find_open_public(&self, skip: &[String]) -> Option<GameHandle> {
        let rooms = self.rooms.lock().await;
        let mut open: Vec<_> = rooms
            .public
            .values()
            .filter(|handle| handle.has_open_seat())
            .filter(|handle| !skip.iter().any(|name| name == handle.name()))
            .collect();
        open.sort_by(|a, b| a.name().cmp(b.name()));
        open.first().map(|handle| (*handle).clone())
    }

    pub async fn get(&self, name: &str) -> Option<GameHandle> {
        self.rooms.lock().await.get(name).cloned()
    }

    /// Drop a game and every player index entry pointing at it.
    pub async fn remove(&self, name: &str) -> Option<GameHandle> {
        let removed = {
            let mut rooms = self.rooms.lock().await;
            rooms
                .public
                .remove(name)
                .or_else(|| rooms.private.remove(name))
        };
        self.players.retain(|_, game| game != name);
        removed
    }

    pub fn bind_player(&self, player_id: &str, game: &str) {
        self.players.insert(player_id.to_string(), game.to_string());
    }

    pub fn unbind_player(&self, player_id: &str) {
        self.players.remove(player_id);
    }

    /// The game `player_id` is seated at, if it is still running.
    pub async fn game_of(&self, player_id: &str) -> Option<GameHandle> {
        let name = self.players.get(player_id)?.value().clone();
        self.get(&name).await
    }

    /// Listing entries of one pool, sorted by game name.
    pub async fn summaries(&self, private: bool) -> Vec<RoomSummary> {
        let mut rooms = self.rooms.lock().await;
        let mut summaries: Vec<_> = rooms
            .pool(private)
            .values()
            .map(GameHandle::summary)
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub async fn game_count(&self) -> usize {
        let rooms = self.rooms.lock().await;
        rooms.public.len() + rooms.private.len()
    }
}
