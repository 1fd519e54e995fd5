//! Game session reconciler.
//!
//! [`LichessGame`] owns the authoritative local position for one remote game.
//! The stream is untrusted: every `gameState` carries the complete move list,
//! and anything other than exactly one new move since the last applied state
//! (a gap, a duplicate, a takeback) rebuilds the position from the initial FEN.
//!
//! State changes happen in [`LichessGame::apply`], which computes the next
//! tracked state on the side and commits it only on success. Notification is a
//! separate step in [`LichessGame::handle_event`].

use std::sync::Arc;

use board_protocol::{
    BoardError, ByColor, Color, GameEvent, GameFull, GameStateEvent, GameStatus,
};
use board_transport::{Control, EventHandler, StreamEnd, StreamHandle};
use parking_lot::Mutex;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Position, Rank, Role, Square};
use tracing::{debug, error, info, warn};

use crate::promotion::{PromotionChoice, PromotionPiece};
use crate::replay::{apply_uci, castling_mode, fen_of, replay, side_to_move, to_uci};

/// A game shared between its stream handler and the rest of the program.
pub type SharedGame = Arc<Mutex<LichessGame>>;

/// Called after every applied transition, with the game lock held.
pub type UpdateHook = Box<dyn FnMut(&GameUpdate) + Send>;

/// Called when the game's stream ends on its own.
pub type StreamEndHook = Box<dyn FnMut(&StreamEnd) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// First snapshot.
    Seeded,
    /// A later snapshot replaced the record.
    Snapshot,
    /// Exactly one new move, applied on top of the previous position.
    Advanced,
    /// Position replayed from the initial FEN.
    Rebuilt,
}

/// Result of an applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub move_count: usize,
    pub last_move: Option<String>,
}

/// What a consumer needs to redraw the board.
#[derive(Debug, Clone)]
pub struct GameUpdate {
    pub game_id: String,
    pub kind: TransitionKind,
    pub position: Chess,
    pub fen: String,
    pub last_move: Option<String>,
    /// Absolute number of `last_move` in the game (1 = white's first move).
    pub last_move_number: usize,
    pub status: GameStatus,
    pub turn: Color,
    pub clocks: ByColor<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracked state
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot plus the position derived from it.
///
/// Invariant: `position` is `initial_fen` with the first
/// `last_applied_move_count` moves of `full.state.moves` played.
#[derive(Debug, Clone)]
pub struct TrackedGame {
    full: GameFull,
    mode: CastlingMode,
    position: Chess,
    last_applied_move_count: usize,
    last_move: Option<String>,
    player_color: Color,
}

impl TrackedGame {
    fn seed(full: GameFull, user_id: Option<&str>) -> Result<Self, BoardError> {
        let mode = castling_mode(full.variant.key)?;
        let moves = full.state.move_list();
        let position = replay(&full.initial_fen, mode, &moves)?;
        let last_applied_move_count = moves.len();
        let last_move = full.state.last_move().map(str::to_string);
        let player_color = full.color_of(user_id.unwrap_or_default());
        Ok(Self {
            full,
            mode,
            position,
            last_applied_move_count,
            last_move,
            player_color,
        })
    }

    /// Next tracked state for an incremental update. `self` is left as is.
    fn advance(&self, state: GameStateEvent) -> Result<(Self, TransitionKind), BoardError> {
        let moves = state.move_list();
        let count = moves.len();

        if count == self.last_applied_move_count + 1 {
            let uci = moves[count - 1];
            let mut position = self.position.clone();
            match apply_uci(&mut position, count, uci) {
                Ok(_) => return Ok((self.with_state(state, position), TransitionKind::Advanced)),
                Err(e) => warn!(
                    "Game {}: {e} does not follow the local position, rebuilding",
                    self.full.id
                ),
            }
        } else {
            debug!(
                "Game {}: move count {} -> {count}, rebuilding",
                self.full.id, self.last_applied_move_count
            );
        }

        let position = replay(&self.full.initial_fen, self.mode, &moves)?;
        Ok((self.with_state(state, position), TransitionKind::Rebuilt))
    }

    fn with_state(&self, state: GameStateEvent, position: Chess) -> Self {
        let last_applied_move_count = state.move_count();
        let last_move = state.last_move().map(str::to_string);
        let mut full = self.full.clone();
        full.state = state;
        Self {
            full,
            mode: self.mode,
            position,
            last_applied_move_count,
            last_move,
            player_color: self.player_color,
        }
    }

    pub fn full(&self) -> &GameFull {
        &self.full
    }

    pub fn state(&self) -> &GameStateEvent {
        &self.full.state
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn fen(&self) -> String {
        fen_of(&self.position)
    }

    pub fn castling_mode(&self) -> CastlingMode {
        self.mode
    }

    pub fn last_applied_move_count(&self) -> usize {
        self.last_applied_move_count
    }

    pub fn last_move(&self) -> Option<&str> {
        self.last_move.as_deref()
    }

    pub fn player_color(&self) -> Color {
        self.player_color
    }

    pub fn turn(&self) -> Color {
        side_to_move(&self.position)
    }
}

#[derive(Debug, Clone)]
pub enum SyncState {
    /// No `gameFull` received yet.
    Uninitialized,
    Tracking(Box<TrackedGame>),
}

// ─────────────────────────────────────────────────────────────────────────────
// LichessGame
// ─────────────────────────────────────────────────────────────────────────────

pub struct LichessGame {
    game_id: String,
    user_id: Option<String>,
    state: SyncState,
    promotion: PromotionChoice,
    stream: Option<StreamHandle>,
    on_update: Option<UpdateHook>,
    on_stream_end: Option<StreamEndHook>,
}

impl std::fmt::Debug for LichessGame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LichessGame")
            .field("game_id", &self.game_id)
            .field("user_id", &self.user_id)
            .field("move_count", &self.last_applied_move_count())
            .field("stream", &self.stream.as_ref().map(StreamHandle::label))
            .finish()
    }
}

impl LichessGame {
    /// `user_id` decides which side is ours; without one we play black,
    /// as does anyone who is not the white player.
    pub fn new(game_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            game_id: game_id.into(),
            user_id,
            state: SyncState::Uninitialized,
            promotion: PromotionChoice::default(),
            stream: None,
            on_update: None,
            on_stream_end: None,
        }
    }

    pub fn with_update_hook(mut self, hook: impl FnMut(&GameUpdate) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(hook));
        self
    }

    pub fn with_stream_end_hook(mut self, hook: impl FnMut(&StreamEnd) + Send + 'static) -> Self {
        self.on_stream_end = Some(Box::new(hook));
        self
    }

    pub fn with_promotion(mut self, promotion: PromotionChoice) -> Self {
        self.promotion = promotion;
        self
    }

    pub fn into_shared(self) -> SharedGame {
        Arc::new(Mutex::new(self))
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.state
    }

    pub fn tracked(&self) -> Option<&TrackedGame> {
        match &self.state {
            SyncState::Tracking(tracked) => Some(tracked),
            SyncState::Uninitialized => None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracked().is_some()
    }

    pub fn position(&self) -> Option<&Chess> {
        self.tracked().map(TrackedGame::position)
    }

    pub fn fen(&self) -> Option<String> {
        self.tracked().map(TrackedGame::fen)
    }

    pub fn last_applied_move_count(&self) -> usize {
        self.tracked().map_or(0, TrackedGame::last_applied_move_count)
    }

    pub fn last_move(&self) -> Option<&str> {
        self.tracked()?.last_move()
    }

    pub fn player_color(&self) -> Option<Color> {
        self.tracked().map(TrackedGame::player_color)
    }

    pub fn status(&self) -> Option<GameStatus> {
        self.tracked().map(|t| t.state().status)
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_some_and(GameStatus::is_finished)
    }

    pub fn is_my_turn(&self) -> bool {
        self.tracked()
            .is_some_and(|t| !t.state().status.is_finished() && t.turn() == t.player_color())
    }

    /// Remaining clock in milliseconds from the latest state.
    pub fn time_of(&self, color: Color) -> Option<u64> {
        self.tracked().map(|t| t.state().time_ms(color))
    }

    pub fn promotion(&self) -> &PromotionChoice {
        &self.promotion
    }

    pub fn promotion_mut(&mut self) -> &mut PromotionChoice {
        &mut self.promotion
    }

    // ── Transitions ─────────────────────────────────────────────────────

    /// Merge one event into the tracked state. No hooks run.
    ///
    /// Returns `None` for events that do not touch the position. On error
    /// the previous state is kept.
    pub fn apply(&mut self, event: GameEvent) -> Result<Option<Transition>, BoardError> {
        let (next, kind) = match event {
            GameEvent::GameFull(full) => {
                if full.id != self.game_id {
                    warn!(
                        "Game {}: snapshot carries id {}, accepting it",
                        self.game_id, full.id
                    );
                }
                let kind = if self.is_tracking() {
                    TransitionKind::Snapshot
                } else {
                    TransitionKind::Seeded
                };
                (TrackedGame::seed(*full, self.user_id.as_deref())?, kind)
            }
            GameEvent::GameState(state) => match &self.state {
                SyncState::Uninitialized => {
                    warn!("Game {}: state update before snapshot, ignoring", self.game_id);
                    return Ok(None);
                }
                SyncState::Tracking(tracked) => tracked.advance(state)?,
            },
            GameEvent::ChatLine(line) => {
                info!(
                    "Game {} [{:?}] {}: {}",
                    self.game_id, line.room, line.username, line.text
                );
                return Ok(None);
            }
            GameEvent::OpponentGone(gone) => {
                match (gone.gone, gone.claim_win_in_seconds) {
                    (true, Some(secs)) => {
                        info!("Game {}: opponent left, win claimable in {secs}s", self.game_id)
                    }
                    (true, None) => info!("Game {}: opponent left", self.game_id),
                    (false, _) => info!("Game {}: opponent is back", self.game_id),
                }
                return Ok(None);
            }
            GameEvent::Unknown { kind, .. } => {
                let err = BoardError::UnknownEventKind { kind };
                warn!("Game {}: ignoring {err}", self.game_id);
                return Ok(None);
            }
        };

        let transition = Transition {
            kind,
            move_count: next.last_applied_move_count,
            last_move: next.last_move.clone(),
        };
        debug!(
            "Game {}: {:?} at move {}",
            self.game_id, transition.kind, transition.move_count
        );
        self.state = SyncState::Tracking(Box::new(next));
        Ok(Some(transition))
    }

    /// [`apply`](Self::apply), then notify the update hook.
    pub fn handle_event(&mut self, event: GameEvent) -> Result<Option<Transition>, BoardError> {
        let kind = event.kind().to_string();
        let transition = self.apply(event).inspect_err(|e| {
            error!("Game {}: failed to apply {kind}: {e}", self.game_id);
        })?;
        if let Some(transition) = &transition {
            self.notify(transition.kind);
        }
        Ok(transition)
    }

    fn notify(&mut self, kind: TransitionKind) {
        let Some(hook) = self.on_update.as_mut() else {
            return;
        };
        let SyncState::Tracking(tracked) = &self.state else {
            return;
        };
        let state = tracked.state();
        let update = GameUpdate {
            game_id: self.game_id.clone(),
            kind,
            position: tracked.position.clone(),
            fen: tracked.fen(),
            last_move: tracked.last_move.clone(),
            last_move_number: tracked.last_applied_move_count,
            status: state.status,
            turn: tracked.turn(),
            clocks: ByColor {
                white: state.wtime,
                black: state.btime,
            },
        };
        hook(&update);
    }

    // ── Local moves ─────────────────────────────────────────────────────

    /// UCI string for a move made on the local board.
    ///
    /// Checks happen in this order: the promotion name, whose turn it is,
    /// then legality. A pawn reaching the last rank without an explicit
    /// `promotion` uses the current [`PromotionChoice`].
    pub fn prepare_move(
        &self,
        from: &str,
        to: &str,
        promotion: Option<&str>,
    ) -> Result<String, BoardError> {
        let explicit = promotion.map(PromotionPiece::from_name).transpose()?;
        let tracked = self.tracked().ok_or(BoardError::GameNotStarted)?;
        if tracked.turn() != tracked.player_color {
            return Err(BoardError::NotYourTurn);
        }

        let ply = tracked.last_applied_move_count + 1;
        let illegal = || BoardError::IllegalMove {
            index: ply,
            uci: format!("{from}{to}"),
        };
        let from: Square = from.parse().map_err(|_| illegal())?;
        let to: Square = to.parse().map_err(|_| illegal())?;

        let position = &tracked.position;
        let promotes = position
            .board()
            .piece_at(from)
            .is_some_and(|p| p.role == Role::Pawn)
            && matches!(to.rank(), Rank::First | Rank::Eighth);
        let promotion = promotes.then(|| explicit.unwrap_or(self.promotion.piece()).role());

        let m = Uci::Normal {
            from,
            to,
            promotion,
        }
        .to_move(position)
        .map_err(|_| illegal())?;
        let uci = to_uci(&m, tracked.mode);
        debug!("Game {}: prepared move {uci}", self.game_id);
        Ok(uci)
    }

    // ── Stream ──────────────────────────────────────────────────────────

    /// Remember the stream feeding this game. Returns the one it replaces,
    /// which the caller should close after releasing the game lock.
    ///
    /// A handle that already ended or was closed is not kept: its end has
    /// been reported (or suppressed) and nothing would clear it again.
    pub fn attach_stream(&mut self, handle: StreamHandle) -> Option<StreamHandle> {
        if !handle.is_active() {
            debug!(
                "Game {}: stream {} already stopped, not attaching",
                self.game_id,
                handle.label()
            );
            return None;
        }
        self.stream.replace(handle)
    }

    /// Forget the stream without closing it.
    pub fn take_stream(&mut self) -> Option<StreamHandle> {
        self.stream.take()
    }

    pub fn stream(&self) -> Option<&StreamHandle> {
        self.stream.as_ref()
    }

    fn stream_ended(&mut self, end: &StreamEnd) {
        match end {
            StreamEnd::Finished => info!("Game {}: stream finished", self.game_id),
            StreamEnd::ServerClosed => {
                warn!("Game {}: stream closed before the game ended", self.game_id)
            }
            StreamEnd::Failed(e) => error!("Game {}: stream failed: {e}", self.game_id),
        }
        self.stream = None;
        if let Some(hook) = self.on_stream_end.as_mut() {
            hook(end);
        }
    }
}

/// Close the game's stream, if any.
///
/// The handle is taken under the game lock and closed after releasing it, so
/// a dispatch waiting on the same lock cannot block the close.
pub fn close_stream(game: &SharedGame) {
    let handle = game.lock().take_stream();
    if let Some(handle) = handle {
        handle.close();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream handler
// ─────────────────────────────────────────────────────────────────────────────

/// Feeds a game stream into a [`SharedGame`].
pub struct GameStreamHandler {
    game: SharedGame,
}

impl GameStreamHandler {
    pub fn new(game: SharedGame) -> Self {
        Self { game }
    }
}

impl EventHandler for GameStreamHandler {
    type Event = GameEvent;

    fn on_event(&mut self, event: GameEvent) -> Control {
        let mut game = self.game.lock();
        // Failures are logged by handle_event and leave the state untouched.
        let _ = game.handle_event(event);
        if game.is_finished() {
            Control::Terminal
        } else {
            Control::Continue
        }
    }

    fn on_end(&mut self, end: StreamEnd) {
        self.game.lock().stream_ended(&end);
    }
}
