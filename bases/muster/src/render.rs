//! Console renderer: host log lines as they are drained, the phase snapshot
//! whenever it changed.

use fleet_engine::{LogEntry, StatusRenderer, StatusSnapshot};

pub struct ConsoleRenderer;

impl StatusRenderer for ConsoleRenderer {
    fn host_line(&self, fqdn: &str, entry: &LogEntry) {
        println!(
            "{:<32} {}  {}",
            fqdn,
            entry.at.format("%H:%M:%S"),
            entry.text
        );
    }

    fn snapshot(&self, snapshot: &StatusSnapshot) {
        println!();
        println!("phase {}", snapshot.phase);
        for actor in snapshot.actors() {
            println!("  {}", actor.actor);
            for host in &actor.hosts {
                println!("    {:<30} {}", host.fqdn, host.state);
            }
        }
        println!();
    }
}
