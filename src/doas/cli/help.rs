pub const USAGE_MSG: &str = "usage: doas [-Lns] [-C config] [-u user] command [args]";
