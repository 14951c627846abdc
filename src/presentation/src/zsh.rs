/// Zsh widget that turns `shai <request>` on the command line into the
/// generated command, ready to edit before pressing Enter again.
pub const ZSH_INIT_SCRIPT: &str = r#"
shai_enter_to_expand() {
  if [[ $BUFFER == shai\ * ]]; then
    local prompt=${BUFFER#shai }

    _shai_spinner() {
      printf "\e[?25l" > /dev/tty
      local spinner="⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"
      while true; do
        for i in {1..10}; do
          printf "\r\e[K\e[36m%s\e[0m Generating..." "${spinner[$i]}" > /dev/tty
          sleep 0.1
        done
      done
    }

    _shai_spinner &|
    local spinner_pid=$!

    local new_command
    new_command=$(command shai --print -- "$prompt" 2>/dev/tty)

    kill "$spinner_pid" 2>/dev/null
    printf "\r\e[K\e[?25h" > /dev/tty

    if [[ -n $new_command ]]; then
      print -s "$BUFFER"
      BUFFER=$new_command
      CURSOR=${#new_command}
      zle redisplay
    else
      zle accept-line
    fi
  else
    zle accept-line
  fi
}

zle -N shai_enter_to_expand
bindkey '^M' shai_enter_to_expand
"#;
