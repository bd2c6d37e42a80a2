use serenity::model::id::UserId;
use std::collections::HashSet;

/// Votos para saltar el track actual.
///
/// Vive dentro de la sesión; el umbral se recalcula en cada consulta contra
/// los oyentes que siguen conectados, y los votos de quienes se fueron se
/// descartan al consultar.
#[derive(Debug, Default)]
pub struct SkipVoteTracker {
    voters: HashSet<UserId>,
}

impl SkipVoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un voto. Devuelve `false` si el usuario ya había votado.
    pub fn add_vote(&mut self, user: UserId) -> bool {
        self.voters.insert(user)
    }

    /// Votos vigentes: filtra los votantes que ya no están entre los oyentes
    pub fn current_votes(&mut self, listeners: &[UserId]) -> usize {
        self.voters.retain(|voter| listeners.contains(voter));
        self.voters.len()
    }

    /// Mayoría requerida: ceil(oyentes / 2), mínimo 1
    pub fn required_votes(listener_count: usize) -> usize {
        listener_count.div_ceil(2).max(1)
    }

    pub fn clear(&mut self) {
        self.voters.clear();
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }
}
