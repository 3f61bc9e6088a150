pub mod driver;
pub mod factory;
pub mod options;
pub mod probe;
pub mod query_options;
pub mod retry;
pub mod scylla;
pub mod session;
pub mod supervisor;

pub use self::scylla::{ScyllaConnection, ScyllaDriver};
pub use driver::{BoundValues, ClusterDriver, ConnectionHandle, RowStream, Statement};
pub use factory::ConnectionFactory;
pub use options::{ClusterConfig, ClusterOption, Options, CQL_VERSION, PROTOCOL_VERSION};
pub use probe::{LivenessProber, PROBE_QUERY};
pub use query_options::{QueryOption, QueryOptions};
pub use retry::RetryPolicy;
pub use session::{RowIter, Session};
pub use supervisor::{connect_supervised, Supervisor, SupervisorExit, SupervisorHandle, SupervisorState};
