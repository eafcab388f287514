use sea_orm::ConnectionTrait;

/// A type that provides a connection to the database, used to implement the
/// [`crate::DatabaseOperations`] trait over both plain connections and
/// transactions.
pub trait DatabaseConnectionProvider {
    /// The underlying connection type.
    type Connection: ConnectionTrait;

    /// Returns a reference to the database connection.
    fn get_connection(&self) -> &Self::Connection;
}
